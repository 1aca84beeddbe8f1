//! Byte order handling for pcap files
//!
//! A capture is written in the byte order of the machine that produced it. The
//! reader decides once, from the magic number, whether that order is the native
//! one or the swapped one, and threads the resulting [Endianness] through every
//! later decode.

use std::io::Write;

/// Represents a trait for byte order operations
pub trait ByteOrder: Clone + Copy {
    /// Converts a byte array to a u16
    fn u16_from_bytes(self, bytes: [u8; 2]) -> u16;
    fn u16_to_bytes(self, value: u16) -> [u8; 2];
    /// Converts a byte array to a u32
    fn u32_from_bytes(self, bytes: [u8; 4]) -> u32;
    fn u32_to_bytes(self, value: u32) -> [u8; 4];

    fn i32_from_bytes(self, bytes: [u8; 4]) -> i32 {
        self.u32_from_bytes(bytes) as i32
    }
    fn i32_to_bytes(self, value: i32) -> [u8; 4] {
        self.u32_to_bytes(value as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigEndian;
impl ByteOrder for BigEndian {
    fn u16_from_bytes(self, bytes: [u8; 2]) -> u16 {
        u16::from_be_bytes(bytes)
    }
    fn u16_to_bytes(self, value: u16) -> [u8; 2] {
        value.to_be_bytes()
    }
    fn u32_from_bytes(self, bytes: [u8; 4]) -> u32 {
        u32::from_be_bytes(bytes)
    }
    fn u32_to_bytes(self, value: u32) -> [u8; 4] {
        value.to_be_bytes()
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LittleEndian;
impl ByteOrder for LittleEndian {
    fn u16_from_bytes(self, bytes: [u8; 2]) -> u16 {
        u16::from_le_bytes(bytes)
    }
    fn u16_to_bytes(self, value: u16) -> [u8; 2] {
        value.to_le_bytes()
    }
    fn u32_from_bytes(self, bytes: [u8; 4]) -> u32 {
        u32::from_le_bytes(bytes)
    }
    fn u32_to_bytes(self, value: u32) -> [u8; 4] {
        value.to_le_bytes()
    }
}

/// Represents the endianness of a capture stream
///
/// Fixed once per stream when the file header is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Little-endian byte order
    LittleEndian,
    /// Big-endian byte order
    BigEndian,
}
impl Endianness {
    /// The byte order of the machine running this code
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endianness::LittleEndian
        } else {
            Endianness::BigEndian
        }
    }
    /// The opposite byte order
    pub const fn swapped(self) -> Self {
        match self {
            Endianness::LittleEndian => Endianness::BigEndian,
            Endianness::BigEndian => Endianness::LittleEndian,
        }
    }
    /// True if this matches the machine's byte order
    pub fn is_native(self) -> bool {
        self == Self::native()
    }
}
impl Default for Endianness {
    fn default() -> Self {
        Self::native()
    }
}
impl ByteOrder for Endianness {
    fn u16_from_bytes(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endianness::BigEndian => BigEndian.u16_from_bytes(bytes),
            Endianness::LittleEndian => LittleEndian.u16_from_bytes(bytes),
        }
    }
    fn u16_to_bytes(self, value: u16) -> [u8; 2] {
        match self {
            Endianness::BigEndian => BigEndian.u16_to_bytes(value),
            Endianness::LittleEndian => LittleEndian.u16_to_bytes(value),
        }
    }
    fn u32_from_bytes(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endianness::BigEndian => BigEndian.u32_from_bytes(bytes),
            Endianness::LittleEndian => LittleEndian.u32_from_bytes(bytes),
        }
    }
    fn u32_to_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Endianness::BigEndian => BigEndian.u32_to_bytes(value),
            Endianness::LittleEndian => LittleEndian.u32_to_bytes(value),
        }
    }
}

/// Reads fixed width fields out of an already sized buffer
pub(crate) trait SliceByteOrder: ByteOrder {
    fn u16_at(self, bytes: &[u8], offset: usize) -> u16;
    fn u32_at(self, bytes: &[u8], offset: usize) -> u32;
}
impl<B: ByteOrder> SliceByteOrder for B {
    #[inline(always)]
    fn u16_at(self, bytes: &[u8], offset: usize) -> u16 {
        self.u16_from_bytes([bytes[offset], bytes[offset + 1]])
    }
    #[inline(always)]
    fn u32_at(self, bytes: &[u8], offset: usize) -> u32 {
        self.u32_from_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }
}

pub trait WriteExt {
    /// Writes a u16 in the given byte order
    fn write_u16<B: ByteOrder>(&mut self, value: u16, byte_order: B) -> Result<(), std::io::Error>;

    fn write_u32<B: ByteOrder>(&mut self, value: u32, byte_order: B) -> Result<(), std::io::Error>;

    fn write_i32<B: ByteOrder>(&mut self, value: i32, byte_order: B) -> Result<(), std::io::Error>;
}
impl<W: Write> WriteExt for W {
    fn write_u16<B: ByteOrder>(&mut self, value: u16, byte_order: B) -> Result<(), std::io::Error> {
        self.write_all(&byte_order.u16_to_bytes(value))
    }
    fn write_u32<B: ByteOrder>(&mut self, value: u32, byte_order: B) -> Result<(), std::io::Error> {
        self.write_all(&byte_order.u32_to_bytes(value))
    }
    fn write_i32<B: ByteOrder>(&mut self, value: i32, byte_order: B) -> Result<(), std::io::Error> {
        self.write_all(&byte_order.i32_to_bytes(value))
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_big_endian() {
        let bytes: [u8; 2] = [0x12, 0x34];
        assert_eq!(BigEndian.u16_from_bytes(bytes), 0x1234);
        let bytes: [u8; 4] = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(BigEndian.u32_from_bytes(bytes), 0x12345678);
        assert_eq!(BigEndian.u32_to_bytes(0x12345678), bytes);
    }
    #[test]
    fn test_little_endian() {
        let bytes: [u8; 2] = [0x34, 0x12];
        assert_eq!(LittleEndian.u16_from_bytes(bytes), 0x1234);
        let bytes: [u8; 4] = [0x78, 0x56, 0x34, 0x12];
        assert_eq!(LittleEndian.u32_from_bytes(bytes), 0x12345678);
        assert_eq!(LittleEndian.u32_to_bytes(0x12345678), bytes);
    }
    #[test]
    fn test_swapped_is_involution() {
        let native = Endianness::native();
        assert!(native.is_native());
        assert!(!native.swapped().is_native());
        assert_eq!(native.swapped().swapped(), native);
    }
    #[test]
    fn test_negative_i32_round_trip() {
        for order in [Endianness::BigEndian, Endianness::LittleEndian] {
            let bytes = order.i32_to_bytes(-3600);
            assert_eq!(order.i32_from_bytes(bytes), -3600);
        }
    }
    #[test]
    fn test_slice_access() {
        let bytes = [0xFF, 0x00, 0x01, 0x00, 0x00, 0x00];
        assert_eq!(LittleEndian.u16_at(&bytes, 2), 1);
        assert_eq!(BigEndian.u32_at(&bytes, 2), 0x0100_0000);
    }
}
