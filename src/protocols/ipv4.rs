use std::net::Ipv4Addr;

use crate::protocols::{FlowKey, TruncatedFrame};

pub const IPV4_MIN_HEADER_SIZE: usize = 20;

/// A raw IPv4 packet
///
/// [Layout](https://en.wikipedia.org/wiki/IPv4#Packet_structure)
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Packet<'a> {
    data: &'a [u8],
}
impl<'a> Ipv4Packet<'a> {
    /// Requires at least the fixed 20 byte header
    pub fn new(data: &'a [u8]) -> Result<Self, TruncatedFrame> {
        if data.len() < IPV4_MIN_HEADER_SIZE {
            return Err(TruncatedFrame {
                protocol: "IPv4",
                needed: IPV4_MIN_HEADER_SIZE,
                got: data.len(),
            });
        }
        Ok(Self { data })
    }
    /// High nibble of the first byte, as laid out in RFC 791
    ///
    /// Some older tooling reads the nibbles the other way round (version in the
    /// low bits, header length in the high bits). That reading does not match
    /// real packets, where `0x45` is version 4 with a 5 word header.
    pub fn version(&self) -> u8 {
        self.data[0] >> 4
    }
    /// Header length in 32 bit words, the low nibble of the first byte (RFC 791)
    pub fn ihl(&self) -> u8 {
        self.data[0] & 0x0F
    }
    pub fn header_length(&self) -> usize {
        self.ihl() as usize * 4
    }
    pub fn ttl(&self) -> u8 {
        self.data[8]
    }
    /// The IP protocol number of the payload (6 for TCP, 17 for UDP...)
    pub fn protocol(&self) -> u8 {
        self.data[9]
    }
    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[12], self.data[13], self.data[14], self.data[15])
    }
    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[16], self.data[17], self.data[18], self.data[19])
    }
    /// Empty when the header length points past the end of the data
    pub fn payload(&self) -> &'a [u8] {
        self.data.get(self.header_length()..).unwrap_or_default()
    }
    pub fn flow_key(&self) -> FlowKey {
        FlowKey::ipv4_pair(self.source(), self.destination())
    }
}
