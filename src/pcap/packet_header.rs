use std::io::Write;

use chrono::{DateTime, Utc};

use crate::{
    byte_order::{Endianness, SliceByteOrder, WriteExt},
    pcap::{PACKET_HEADER_SIZE, PcapParseError, file_header::TimeResolution},
};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// The header in front of every captured frame
///
/// The sub-second fraction is only meaningful together with the resolution of
/// the capture it came from, so that resolution travels with the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    ts_sec: u32,
    ts_frac: u32,
    /// The length of the packet data included in the file
    include_len: u32,
    /// The original length of the packet data
    orig_len: u32,
    resolution: TimeResolution,
}

impl PacketHeader {
    /// Builds a header, rejecting a fraction that does not fit the resolution
    pub fn new(
        ts_sec: u32,
        ts_frac: u32,
        include_len: u32,
        orig_len: u32,
        resolution: TimeResolution,
    ) -> Result<Self, PcapParseError> {
        let limit = resolution.ticks_per_second();
        if ts_frac >= limit {
            return Err(PcapParseError::FieldValidation {
                field: "ts_frac",
                value: ts_frac as u64,
                limit: limit as u64,
            });
        }
        Ok(Self {
            ts_sec,
            ts_frac,
            include_len,
            orig_len,
            resolution,
        })
    }
    /// Decodes a record header in the stream's byte order
    #[inline(always)]
    pub fn parse_bytes(
        bytes: &[u8; PACKET_HEADER_SIZE],
        endianness: Endianness,
        resolution: TimeResolution,
    ) -> Result<Self, PcapParseError> {
        Self::new(
            endianness.u32_at(bytes, 0),
            endianness.u32_at(bytes, 4),
            endianness.u32_at(bytes, 8),
            endianness.u32_at(bytes, 12),
            resolution,
        )
    }
    /// The checks only applied when strict validation is requested
    ///
    /// Some captures store more than the wire length on purpose (trailing
    /// metadata), which is why these are not part of [Self::new].
    pub fn validate_strict(&self, snap_length: u32) -> Result<(), PcapParseError> {
        if self.orig_len < self.include_len {
            return Err(PcapParseError::StrictValidation {
                field: "included length",
                value: self.include_len as u64,
                limit_name: "original length",
                limit: self.orig_len as u64,
            });
        }
        if snap_length < self.include_len {
            return Err(PcapParseError::StrictValidation {
                field: "included length",
                value: self.include_len as u64,
                limit_name: "snap length",
                limit: snap_length as u64,
            });
        }
        Ok(())
    }
    pub fn write<W: Write>(
        &self,
        writer: &mut W,
        endianness: Endianness,
    ) -> Result<(), std::io::Error> {
        writer.write_u32(self.ts_sec, endianness)?;
        writer.write_u32(self.ts_frac, endianness)?;
        writer.write_u32(self.include_len, endianness)?;
        writer.write_u32(self.orig_len, endianness)?;
        Ok(())
    }
    pub fn to_bytes(&self, endianness: Endianness) -> [u8; PACKET_HEADER_SIZE] {
        let mut bytes = [0u8; PACKET_HEADER_SIZE];
        let mut cursor: &mut [u8] = &mut bytes;
        // Writing into a correctly sized array cannot fail
        let _ = self.write(&mut cursor, endianness);
        bytes
    }

    pub fn ts_sec(&self) -> u32 {
        self.ts_sec
    }
    pub fn set_ts_sec(&mut self, ts_sec: u32) {
        self.ts_sec = ts_sec;
    }
    pub fn ts_frac(&self) -> u32 {
        self.ts_frac
    }
    pub fn include_len(&self) -> u32 {
        self.include_len
    }
    pub fn set_include_len(&mut self, include_len: u32) {
        self.include_len = include_len;
    }
    pub fn orig_len(&self) -> u32 {
        self.orig_len
    }
    pub fn set_orig_len(&mut self, orig_len: u32) {
        self.orig_len = orig_len;
    }
    pub fn resolution(&self) -> TimeResolution {
        self.resolution
    }

    /// Nanoseconds since the unix epoch
    pub fn epoch_nanos(&self) -> u64 {
        self.ts_sec as u64 * NANOS_PER_SECOND
            + self.ts_frac as u64 * self.resolution.nanos_per_tick() as u64
    }
    /// Seconds since the unix epoch. Loses precision for nanosecond captures
    pub fn epoch_seconds_f64(&self) -> f64 {
        self.ts_sec as f64 + self.ts_frac as f64 / self.resolution.ticks_per_second() as f64
    }
    /// The timestamp in UTC, truncated to microseconds whatever the resolution
    pub fn timestamp_datetime(&self) -> Option<DateTime<Utc>> {
        let ticks_per_micro = self.resolution.ticks_per_second() / 1_000_000;
        let micros = self.ts_frac / ticks_per_micro;
        DateTime::from_timestamp(self.ts_sec as i64, micros * 1_000)
    }
    /// The same instant expressed in another resolution
    ///
    /// Going from nanoseconds to microseconds drops the sub-microsecond part.
    pub fn rescaled(mut self, resolution: TimeResolution) -> Self {
        match (self.resolution, resolution) {
            (TimeResolution::Microsecond, TimeResolution::Nanosecond) => self.ts_frac *= 1_000,
            (TimeResolution::Nanosecond, TimeResolution::Microsecond) => self.ts_frac /= 1_000,
            _ => {}
        }
        self.resolution = resolution;
        self
    }
    /// Moves the timestamp by whole seconds. `None` if it leaves the u32 range
    pub fn shifted(mut self, seconds: i64) -> Option<Self> {
        let ts_sec = (self.ts_sec as i64).checked_add(seconds)?;
        self.ts_sec = u32::try_from(ts_sec).ok()?;
        Some(self)
    }
}
