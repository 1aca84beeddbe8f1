use std::io::{self, Write};

use crate::pcap::{
    PcapParseError, Record, file_header::PcapFileHeader, packet_header::PacketHeader,
};
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NewPacketHeader {
    pub ts_sec: u32,
    pub ts_frac: u32,
    /// The original length of the packet data. Defaults to the content length
    pub orig_len: Option<u32>,
}
/// A Sync Pcap Writer
///
/// Records are encoded in the byte order and time resolution of the file header
/// the writer was created with, whatever capture they were read from.
pub struct SyncPcapWriter<W: Write> {
    target: W,
    header: PcapFileHeader,
    records_written: u64,
}

impl<W: Write> SyncPcapWriter<W> {
    /// Writes the file header and returns a writer ready for records
    pub fn new(mut target: W, header: PcapFileHeader) -> Result<Self, io::Error> {
        header.write(&mut target)?;
        Ok(Self::without_header(target, header))
    }
    /// A writer for a target that already holds a file header, or should not get one
    pub fn without_header(target: W, header: PcapFileHeader) -> Self {
        Self {
            target,
            header,
            records_written: 0,
        }
    }
    pub fn file_header(&self) -> &PcapFileHeader {
        &self.header
    }
    pub fn records_written(&self) -> u64 {
        self.records_written
    }
    /// Writes one record header followed by its data
    ///
    /// `data` must be exactly `include_len` bytes long.
    pub fn write_packet(&mut self, header: &PacketHeader, data: &[u8]) -> Result<(), io::Error> {
        if header.include_len() as usize != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Included length {} does not match data length {}",
                    header.include_len(),
                    data.len()
                ),
            ));
        }
        let header = header.rescaled(self.header.resolution());
        self.target
            .write_all(&header.to_bytes(self.header.endianness()))?;
        self.target.write_all(data)?;
        self.records_written += 1;
        Ok(())
    }
    pub fn write_record(&mut self, record: &Record) -> Result<(), io::Error> {
        self.write_packet(&record.header, &record.data)
    }
    /// Writes a packet whose lengths are taken from the content
    pub fn write_new_packet(
        &mut self,
        header: NewPacketHeader,
        content: &[u8],
    ) -> Result<(), PcapParseError> {
        let include_len = content.len() as u32;
        let packet_header = PacketHeader::new(
            header.ts_sec,
            header.ts_frac,
            include_len,
            header.orig_len.unwrap_or(include_len),
            self.header.resolution(),
        )?;
        self.write_packet(&packet_header, content)?;
        Ok(())
    }
    pub fn get_ref(&self) -> &W {
        &self.target
    }
    /// Flushes and hands back the target
    pub fn finish(mut self) -> Result<W, io::Error> {
        self.target.flush()?;
        Ok(self.target)
    }
}
