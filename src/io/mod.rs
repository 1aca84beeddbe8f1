//! Byte sources and sinks for captures on disk
//!
//! Both sides handle gzip transparently: sources are sniffed for the gzip magic,
//! sinks compress when the file name ends in `.gz`.
mod sink;
mod source;
pub use sink::*;
pub use source::*;
