//! Builders for in-memory captures used across the unit tests
use etherparse::PacketBuilder;

use std::path::Path;

use crate::{
    io::open_source,
    link_type::LinkType,
    pcap::{
        ReaderOptions, Record, file_header::PcapFileHeader, open_reader,
        packet_header::PacketHeader,
    },
};

pub(crate) struct CaptureBuilder {
    header: PcapFileHeader,
    bytes: Vec<u8>,
}
impl CaptureBuilder {
    pub fn new(header: PcapFileHeader) -> Self {
        Self {
            header,
            bytes: header.to_bytes().to_vec(),
        }
    }
    pub fn ethernet() -> Self {
        Self::new(PcapFileHeader::default())
    }
    pub fn record(mut self, ts_sec: u32, ts_frac: u32, data: &[u8]) -> Self {
        let header = PacketHeader::new(
            ts_sec,
            ts_frac,
            data.len() as u32,
            data.len() as u32,
            self.header.resolution(),
        )
        .expect("test record timestamp out of range");
        self.bytes
            .extend_from_slice(&header.to_bytes(self.header.endianness()));
        self.bytes.extend_from_slice(data);
        self
    }
    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// An Ethernet + IPv4 + UDP frame between two fixed MAC addresses
pub(crate) fn udp_frame(source: [u8; 4], destination: [u8; 4], payload: &[u8]) -> Vec<u8> {
    ethernet_udp_frame([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12], source, destination, payload)
}

pub(crate) fn ethernet_udp_frame(
    source_mac: [u8; 6],
    destination_mac: [u8; 6],
    source: [u8; 4],
    destination: [u8; 4],
    payload: &[u8],
) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(source_mac, destination_mac)
        .ipv4(source, destination, 20)
        .udp(21, 1234);
    let mut result = Vec::<u8>::with_capacity(builder.size(payload.len()));
    builder
        .write(&mut result, payload)
        .expect("writing to a Vec cannot fail");
    result
}

/// A raw IPv4 + UDP packet, as stored under [LinkType::Ipv4]
pub(crate) fn ipv4_udp_packet(source: [u8; 4], destination: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ipv4(source, destination, 20).udp(21, 1234);
    let mut result = Vec::<u8>::with_capacity(builder.size(payload.len()));
    builder
        .write(&mut result, payload)
        .expect("writing to a Vec cannot fail");
    result
}

pub(crate) fn ipv4_header() -> PcapFileHeader {
    let mut header = PcapFileHeader::default();
    header.set_network(LinkType::Ipv4.value());
    header
}

/// Reads a whole capture file back, decompressing if needed
pub(crate) fn read_capture(path: impl AsRef<Path>) -> anyhow::Result<(PcapFileHeader, Vec<Record>)> {
    let source = open_source(path.as_ref())?;
    let (header, records) = open_reader(source, ReaderOptions::default())?;
    let records = records.collect::<Result<Vec<_>, _>>()?;
    Ok((header, records))
}
