//! Parsing and writing for PCAP Files based on the libpcap format
//!
//! Sources
//! - [Wireshark Wiki - File Format](https://wiki.wireshark.org/Development/LibpcapFileFormat)
pub mod file_header;
pub mod packet_header;
mod sync;
pub use sync::*;
#[cfg(feature = "tokio-async")]
mod tokio_impl;
use thiserror::Error;
#[cfg(feature = "tokio-async")]
pub use tokio_impl::AsyncPcapReader;

/// Size of the file header on the wire
pub const FILE_HEADER_SIZE: usize = 24;
/// Size of every record header on the wire
pub const PACKET_HEADER_SIZE: usize = 16;

/// Errors that can occur when parsing or writing pcap files
///
/// None of these are recoverable: the stream that produced them must not be
/// read any further.
#[derive(Debug, Error)]
pub enum PcapParseError {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("Short read of {what}: expected {expected} bytes, got {got}")]
    ShortRead {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("Invalid {field}: {value} must be less than {limit}")]
    FieldValidation {
        field: &'static str,
        value: u64,
        limit: u64,
    },
    #[error("Strict validation failed: {field} ({value}) exceeds {limit_name} ({limit})")]
    StrictValidation {
        field: &'static str,
        value: u64,
        limit_name: &'static str,
        limit: u64,
    },
}
