//! Streaming reader, writer and record tools for libpcap capture files
//!
//! The [pcap] module holds the codec and the streaming reader/writer. Everything
//! else is built on top of it: the [listener] driver feeds records to the
//! [tools], which filter, split, merge and summarize captures without loading
//! them into memory.
pub mod byte_order;
pub mod io;
pub mod link_type;
pub mod listener;
pub mod pcap;
pub mod protocols;
pub mod statistics;
pub mod tools;
pub mod units;
pub(crate) mod utils;
mod version;
pub use version::Version;
#[cfg(test)]
pub(crate) mod test_helpers;
