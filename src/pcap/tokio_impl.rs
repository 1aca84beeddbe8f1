//! Asynchronous reader for PCAP files
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::pcap::{
    FILE_HEADER_SIZE, PACKET_HEADER_SIZE, PcapParseError, ReaderOptions, Record,
    file_header::PcapFileHeader, packet_header::PacketHeader,
};

/// Async counterpart of [crate::utils::read_up_to]
async fn read_up_to<R: AsyncRead + Unpin>(
    reader: &mut R,
    buffer: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Follows the same end-of-stream and short read rules as [crate::pcap::SyncPcapReader]
#[derive(Debug)]
pub struct AsyncPcapReader<R: AsyncRead + Unpin> {
    reader: R,
    /// Buffer for packet data
    buffer: Vec<u8>,
    /// Buffer for packet header
    header_buffer: [u8; PACKET_HEADER_SIZE],
    file_header: PcapFileHeader,
    options: ReaderOptions,
}
impl<R: AsyncRead + Unpin> AsyncPcapReader<R> {
    /// Creates a new `AsyncPcapReader` from a reader
    /// Returns `Ok(Self)` on success, or `Err` if there was an error
    /// reading the file header
    pub async fn new(reader: R) -> Result<Self, PcapParseError> {
        Self::with_options(reader, ReaderOptions::default()).await
    }
    pub async fn with_options(mut reader: R, options: ReaderOptions) -> Result<Self, PcapParseError> {
        let mut file_header = [0u8; FILE_HEADER_SIZE];
        let got = read_up_to(&mut reader, &mut file_header).await?;
        let file_header = PcapFileHeader::from_stream_start(&file_header, got)?;
        Ok(Self {
            reader,
            buffer: Vec::new(),
            file_header,
            header_buffer: [0; PACKET_HEADER_SIZE],
            options,
        })
    }
    /// Returns the file header of the pcap file
    pub fn file_header(&self) -> &PcapFileHeader {
        &self.file_header
    }
    /// Reads the next packet from the pcap file
    /// Returns `Ok(None)` if there are no more packets to read
    /// Returns `Err` if there was an error reading the packet
    pub async fn next_packet(&mut self) -> Result<Option<(PacketHeader, &[u8])>, PcapParseError> {
        let got = read_up_to(&mut self.reader, &mut self.header_buffer).await?;
        if got == 0 {
            return Ok(None);
        }
        if got != PACKET_HEADER_SIZE {
            return Err(PcapParseError::ShortRead {
                what: "record header",
                expected: PACKET_HEADER_SIZE,
                got,
            });
        }
        let packet_header = PacketHeader::parse_bytes(
            &self.header_buffer,
            self.file_header.endianness(),
            self.file_header.resolution(),
        )?;
        if self.options.strict {
            packet_header.validate_strict(self.file_header.snap_length())?;
        }
        let include_len = packet_header.include_len() as usize;
        self.buffer.clear();
        let got = (&mut self.reader)
            .take(include_len as u64)
            .read_to_end(&mut self.buffer)
            .await?;
        if got != include_len {
            return Err(PcapParseError::ShortRead {
                what: "record data",
                expected: include_len,
                got,
            });
        }
        Ok(Some((packet_header, &self.buffer)))
    }
    /// Turns the reader into a stream of owned records that ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Record, PcapParseError>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut reader = state?;
            let next = match reader.next_packet().await {
                Ok(Some((header, data))) => Ok(Some(Record {
                    header,
                    data: data.to_vec(),
                })),
                Ok(None) => Ok(None),
                Err(err) => Err(err),
            };
            match next {
                Ok(Some(record)) => Some((Ok(record), Some(reader))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}
