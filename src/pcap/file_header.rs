use std::io::{Read, Write};

use crate::{
    Version,
    byte_order::{ByteOrder, Endianness, SliceByteOrder, WriteExt},
    link_type::{InvalidLinkType, LinkType},
    pcap::{FILE_HEADER_SIZE, PcapParseError},
    utils::read_up_to,
};

/// Magic number of a microsecond capture, as read in the writer's byte order
pub const PCAP_MAGIC_MICROSECONDS: u32 = 0xa1b2_c3d4;
/// Magic number of a nanosecond capture, as read in the writer's byte order
pub const PCAP_MAGIC_NANOSECONDS: u32 = 0xa1b2_3c4d;
/// [PCAP_MAGIC_MICROSECONDS] read in the opposite byte order
pub const PCAP_MAGIC_MICROSECONDS_SWAPPED: u32 = 0xd4c3_b2a1;
/// [PCAP_MAGIC_NANOSECONDS] read in the opposite byte order
pub const PCAP_MAGIC_NANOSECONDS_SWAPPED: u32 = 0x4d3c_b2a1;

/// The unit of the sub-second timestamp fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeResolution {
    Microsecond,
    Nanosecond,
}
impl TimeResolution {
    /// The number of fraction ticks in one second
    pub const fn ticks_per_second(self) -> u32 {
        match self {
            TimeResolution::Microsecond => 1_000_000,
            TimeResolution::Nanosecond => 1_000_000_000,
        }
    }
    /// How many nanoseconds one fraction tick represents
    pub const fn nanos_per_tick(self) -> u32 {
        1_000_000_000 / self.ticks_per_second()
    }
}
/// Resolution assumed for record headers built without a capture
impl Default for TimeResolution {
    fn default() -> Self {
        TimeResolution::Nanosecond
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicNumber {
    Microsecond,
    Nanosecond,
}
impl MagicNumber {
    /// The canonical value of the magic number
    pub const fn value(self) -> u32 {
        match self {
            MagicNumber::Microsecond => PCAP_MAGIC_MICROSECONDS,
            MagicNumber::Nanosecond => PCAP_MAGIC_NANOSECONDS,
        }
    }
    pub const fn resolution(self) -> TimeResolution {
        match self {
            MagicNumber::Microsecond => TimeResolution::Microsecond,
            MagicNumber::Nanosecond => TimeResolution::Nanosecond,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicNumberAndEndianness {
    pub magic_number: MagicNumber,
    pub endianness: Endianness,
}
impl MagicNumberAndEndianness {
    /// Classifies the first four bytes of a capture
    ///
    /// The bytes are read in the machine's byte order. A match against one of the
    /// swapped constants means the rest of the stream is in the opposite order.
    /// Returns `None` for anything that is not one of the four known constants.
    pub fn detect(bytes: [u8; 4]) -> Option<Self> {
        let native = Endianness::native();
        let (magic_number, endianness) = match u32::from_ne_bytes(bytes) {
            PCAP_MAGIC_MICROSECONDS => (MagicNumber::Microsecond, native),
            PCAP_MAGIC_NANOSECONDS => (MagicNumber::Nanosecond, native),
            PCAP_MAGIC_MICROSECONDS_SWAPPED => (MagicNumber::Microsecond, native.swapped()),
            PCAP_MAGIC_NANOSECONDS_SWAPPED => (MagicNumber::Nanosecond, native.swapped()),
            _ => return None,
        };
        Some(Self {
            magic_number,
            endianness,
        })
    }
}

/// The single header at the start of a capture
///
/// Byte order and time resolution are derived from the magic number when the
/// header is built and never change afterwards. Only the snap length and the
/// network (link type) can be rewritten, by tools producing a modified copy of
/// a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcapFileHeader {
    /// 0..4
    magic_number: u32,
    /// 4..8
    version: Version,
    /// 8..12
    timezone: i32,
    /// 12..16
    sig_figs: u32,
    /// 16..20
    snap_length: u32,
    /// 20..24
    network: u32,
    endianness: Endianness,
    resolution: TimeResolution,
}

impl PcapFileHeader {
    /// A version 2.4 header in the machine's byte order
    pub fn new(magic_number: MagicNumber, snap_length: u32, network: u32) -> Self {
        Self::from_raw(
            magic_number.value(),
            Version::PCAP_VERSION_2_4,
            0,
            0,
            snap_length,
            network,
        )
    }
    /// Builds a header from already decoded field values, in the machine's byte order
    ///
    /// Any magic value is accepted; anything other than the two canonical
    /// constants is reported by [Self::is_magic_valid] and treated as microseconds.
    pub fn from_raw(
        magic_number: u32,
        version: Version,
        timezone: i32,
        sig_figs: u32,
        snap_length: u32,
        network: u32,
    ) -> Self {
        let resolution = if magic_number == PCAP_MAGIC_NANOSECONDS {
            TimeResolution::Nanosecond
        } else {
            TimeResolution::Microsecond
        };
        Self {
            magic_number,
            version,
            timezone,
            sig_figs,
            snap_length,
            network,
            endianness: Endianness::native(),
            resolution,
        }
    }
    /// The same header, encoded in a different byte order when written
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }
    /// Reads the file header from the reader
    ///
    /// Fewer than 24 bytes is a [PcapParseError::ShortRead].
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, PcapParseError> {
        let mut header = [0u8; FILE_HEADER_SIZE];
        let got = read_up_to(reader, &mut header)?;
        Self::from_stream_start(&header, got)
    }
    /// Decodes the header at the start of a stream, of which `got` bytes arrived
    ///
    /// Shared by the sync and async readers. Warns about an unrecognized magic
    /// number but still returns the header.
    pub(crate) fn from_stream_start(
        bytes: &[u8; FILE_HEADER_SIZE],
        got: usize,
    ) -> Result<Self, PcapParseError> {
        if got != FILE_HEADER_SIZE {
            return Err(PcapParseError::ShortRead {
                what: "file header",
                expected: FILE_HEADER_SIZE,
                got,
            });
        }
        let header = Self::parse_bytes(bytes);
        if !header.is_magic_valid() {
            tracing::warn!(
                "Capture has an unrecognized magic number {:#010x}",
                header.magic_number()
            );
        }
        Ok(header)
    }
    /// Decodes the header
    ///
    /// An unknown magic number is not an error: the fields are decoded in the
    /// machine's byte order and the header is flagged as invalid.
    pub fn parse_bytes(bytes: &[u8; FILE_HEADER_SIZE]) -> Self {
        let endianness = match MagicNumberAndEndianness::detect([bytes[0], bytes[1], bytes[2], bytes[3]]) {
            Some(detected) => detected.endianness,
            None => Endianness::native(),
        };
        let header = Self::from_raw(
            endianness.u32_at(bytes, 0),
            Version::parse(&bytes[4..8], endianness),
            endianness.i32_from_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            endianness.u32_at(bytes, 12),
            endianness.u32_at(bytes, 16),
            endianness.u32_at(bytes, 20),
        );
        header.with_endianness(endianness)
    }
    /// Encodes the header in its own byte order
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        let mut cursor: &mut [u8] = &mut bytes;
        // Writing into a correctly sized array cannot fail
        let _ = self.write(&mut cursor);
        bytes
    }
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), std::io::Error> {
        let order = self.endianness;
        writer.write_u32(self.magic_number, order)?;
        writer.write_u16(self.version.major, order)?;
        writer.write_u16(self.version.minor, order)?;
        writer.write_i32(self.timezone, order)?;
        writer.write_u32(self.sig_figs, order)?;
        writer.write_u32(self.snap_length, order)?;
        writer.write_u32(self.network, order)?;
        Ok(())
    }

    /// The magic number as decoded in the stream's byte order
    pub fn magic_number(&self) -> u32 {
        self.magic_number
    }
    pub fn magic(&self) -> Option<MagicNumber> {
        match self.magic_number {
            PCAP_MAGIC_MICROSECONDS => Some(MagicNumber::Microsecond),
            PCAP_MAGIC_NANOSECONDS => Some(MagicNumber::Nanosecond),
            _ => None,
        }
    }
    pub fn is_magic_valid(&self) -> bool {
        self.magic().is_some()
    }
    pub fn resolution(&self) -> TimeResolution {
        self.resolution
    }
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }
    pub fn version(&self) -> Version {
        self.version
    }
    /// Offset from UTC in seconds. Almost always zero
    pub fn timezone(&self) -> i32 {
        self.timezone
    }
    pub fn sig_figs(&self) -> u32 {
        self.sig_figs
    }
    pub fn snap_length(&self) -> u32 {
        self.snap_length
    }
    pub fn set_snap_length(&mut self, snap_length: u32) {
        self.snap_length = snap_length;
    }
    /// The raw link type value
    pub fn network(&self) -> u32 {
        self.network
    }
    pub fn set_network(&mut self, network: u32) {
        self.network = network;
    }
    pub fn link_type(&self) -> Result<LinkType, InvalidLinkType> {
        LinkType::try_from(self.network)
    }
}
impl Default for PcapFileHeader {
    fn default() -> Self {
        Self::new(MagicNumber::Microsecond, 65535, LinkType::Ethernet.value())
    }
}
impl TryFrom<&[u8]> for PcapFileHeader {
    type Error = PcapParseError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: &[u8; FILE_HEADER_SIZE] =
            value.try_into().map_err(|_| PcapParseError::ShortRead {
                what: "file header",
                expected: FILE_HEADER_SIZE,
                got: value.len(),
            })?;
        Ok(Self::parse_bytes(bytes))
    }
}
