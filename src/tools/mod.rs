//! Record processing tools built on [crate::listener]
//!
//! Each tool is either a [crate::listener::PcapListener] ([FilterListener],
//! [SplitListener], [FlowSplitListener], [SummaryListener]) or drives several
//! readers itself ([merge]).
use std::io;

use thiserror::Error;

use crate::{
    io::PcapSink,
    pcap::{PcapParseError, SyncPcapWriter, file_header::PcapFileHeader},
    protocols::TruncatedFrame,
};

mod filter;
mod merge;
mod split;
mod split_flows;
mod summary;
pub use filter::*;
pub use merge::*;
pub use split::*;
pub use split_flows::*;
pub use summary::*;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Parse(#[from] PcapParseError),
    #[error(transparent)]
    IO(#[from] io::Error),
    #[error("Invalid magic number {0:#010x}")]
    InvalidMagic(u32),
    #[error("Link type is {got} instead of {expected}")]
    LinkTypeMismatch { expected: u32, got: u32 },
    #[error("Unsupported link type {0}")]
    UnsupportedLinkType(u32),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Shifting timestamp {ts_sec} by {shift} seconds leaves the representable range")]
    TimestampOutOfRange { ts_sec: u32, shift: i64 },
    #[error(transparent)]
    TruncatedFrame(#[from] TruncatedFrame),
    #[error("Received a record before the file header")]
    MissingHeader,
}

/// Which bytes of each record are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    /// Maximum number of bytes kept per record
    pub snap_length: u32,
    /// Bytes skipped at the start of each record
    pub data_offset: usize,
    /// Bytes dropped from the end of each record
    pub data_end_offset: usize,
}
impl Default for Truncation {
    fn default() -> Self {
        Self {
            snap_length: 65535,
            data_offset: 0,
            data_end_offset: 0,
        }
    }
}
impl Truncation {
    /// Keeps `[offset, min(offset + snap_length, len - offset - end_offset))`
    ///
    /// Empty when the offsets leave nothing.
    pub fn apply<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = self.data_offset;
        let end = start.saturating_add(self.snap_length as usize).min(
            data.len()
                .saturating_sub(start)
                .saturating_sub(self.data_end_offset),
        );
        data.get(start..end).unwrap_or_default()
    }
    /// The snap length written to output headers
    pub fn output_snap_length(&self, input: u32) -> u32 {
        if self.snap_length > input {
            tracing::warn!(
                "New snap length is greater than original: {} > {}",
                self.snap_length,
                input
            );
        }
        self.snap_length.min(input)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputOptions {
    /// Append to existing outputs instead of truncating them
    pub append: bool,
    /// Never write a file header
    pub no_header: bool,
}

/// Wraps a freshly opened sink in a writer
///
/// The file header is written unless suppressed or the sink already has content,
/// so appending to an existing capture never repeats its header.
pub(crate) fn start_output<S: PcapSink>(
    sink: S,
    header: PcapFileHeader,
    options: OutputOptions,
) -> io::Result<SyncPcapWriter<S>> {
    if options.no_header || sink.position() > 0 {
        Ok(SyncPcapWriter::without_header(sink, header))
    } else {
        SyncPcapWriter::new(sink, header)
    }
}

pub(crate) fn close_output<S: PcapSink>(writer: SyncPcapWriter<S>) -> io::Result<()> {
    writer.finish()?.close()
}

pub(crate) fn check_fraction(name: &str, value: f64) -> Result<(), ToolError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ToolError::InvalidConfig(format!(
            "{name} must be between 0 and 1, got {value}"
        )));
    }
    Ok(())
}
