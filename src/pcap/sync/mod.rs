//! Synchronous PCAP reader and writer
use std::io::Read;
pub mod writer;
pub use writer::{NewPacketHeader, SyncPcapWriter};
use crate::{
    Version,
    pcap::{
        PACKET_HEADER_SIZE, PcapParseError, file_header::PcapFileHeader,
        packet_header::PacketHeader,
    },
    utils::read_up_to,
};

/// Options applied while reading records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReaderOptions {
    /// Also check `orig_len >= include_len` and `include_len <= snap_length`
    pub strict: bool,
}

/// One captured frame, owning its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: PacketHeader,
    pub data: Vec<u8>,
}

/// A synchronous reader for PCAP files
///
/// Reads exactly one record header and its data per call, so memory use does not
/// grow with the size of the capture.
#[derive(Debug)]
pub struct SyncPcapReader<R: Read> {
    reader: R,
    /// Data of the current record
    buffer: Vec<u8>,
    header_buffer: [u8; PACKET_HEADER_SIZE],
    file_header: PcapFileHeader,
    options: ReaderOptions,
}
impl<R: Read> SyncPcapReader<R> {
    /// Creates a new `SyncPcapReader` from a reader
    /// Returns `Ok(Self)` on success, or `Err` if the file header could not be read
    pub fn new(reader: R) -> Result<Self, PcapParseError> {
        Self::with_options(reader, ReaderOptions::default())
    }
    pub fn with_options(mut reader: R, options: ReaderOptions) -> Result<Self, PcapParseError> {
        let file_header = PcapFileHeader::read(&mut reader)?;
        Ok(Self::new_with_header(reader, file_header, options))
    }
    pub(crate) fn new_with_header(
        reader: R,
        file_header: PcapFileHeader,
        options: ReaderOptions,
    ) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            file_header,
            header_buffer: [0; PACKET_HEADER_SIZE],
            options,
        }
    }
    /// Returns the file header of the pcap file
    pub fn file_header(&self) -> &PcapFileHeader {
        &self.file_header
    }
    /// Returns the version of the pcap file
    pub fn version(&self) -> Version {
        self.file_header.version()
    }
    /// Reads the next packet from the pcap file
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a record boundary.
    /// A partial record header or partial data is a [PcapParseError::ShortRead].
    pub fn next_packet(&mut self) -> Result<Option<(PacketHeader, &[u8])>, PcapParseError> {
        let got = read_up_to(&mut self.reader, &mut self.header_buffer)?;
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
        // Grows with the bytes delivered, not with what a corrupt header claims
        let include_len = packet_header.include_len() as usize;
        self.buffer.clear();
        let got = (&mut self.reader)
            .take(include_len as u64)
            .read_to_end(&mut self.buffer)?;
        if got != include_len {
            return Err(PcapParseError::ShortRead {
                what: "record data",
                expected: include_len,
                got,
            });
        }
        Ok(Some((packet_header, &self.buffer)))
    }
    /// Turns the reader into an iterator of owned records
    pub fn into_records(self) -> Records<R> {
        Records {
            reader: self,
            finished: false,
        }
    }
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Opens a capture: reads its header and hands back the lazy record sequence
pub fn open_reader<R: Read>(
    reader: R,
    options: ReaderOptions,
) -> Result<(PcapFileHeader, Records<R>), PcapParseError> {
    let reader = SyncPcapReader::with_options(reader, options)?;
    Ok((*reader.file_header(), reader.into_records()))
}

/// Single pass iterator over the records of a capture
///
/// Stops for good after the first error.
#[derive(Debug)]
pub struct Records<R: Read> {
    reader: SyncPcapReader<R>,
    finished: bool,
}
impl<R: Read> Records<R> {
    pub fn file_header(&self) -> &PcapFileHeader {
        self.reader.file_header()
    }
}
impl<R: Read> Iterator for Records<R> {
    type Item = Result<Record, PcapParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.reader.next_packet() {
            Ok(Some((header, data))) => Some(Ok(Record {
                header,
                data: data.to_vec(),
            })),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
impl<R: Read> std::iter::FusedIterator for Records<R> {}
