//! Minimal views over the link and network layer headers needed to group records into flows
//!
//! These read fixed offsets only. No options, VLAN tags or checksums are interpreted.
use std::{fmt, net::Ipv4Addr};

use thiserror::Error;

mod ethernet;
mod ipv4;
pub use ethernet::*;
pub use ipv4::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{protocol} frame too short: needed {needed} bytes, got {got}")]
pub struct TruncatedFrame {
    pub protocol: &'static str,
    pub needed: usize,
    pub got: usize,
}

/// Identifies the two endpoints of a conversation regardless of direction
///
/// The lower address (byte-wise) always comes first, so both directions of
/// a flow produce the same key. Displays as `lower_upper`, which is used as
/// a file name by the flow splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FlowKey {
    Mac { lower: MacAddress, upper: MacAddress },
    Ipv4 { lower: Ipv4Addr, upper: Ipv4Addr },
}
impl FlowKey {
    pub fn mac_pair(a: MacAddress, b: MacAddress) -> Self {
        let (lower, upper) = ordered(a, b);
        FlowKey::Mac { lower, upper }
    }
    pub fn ipv4_pair(a: Ipv4Addr, b: Ipv4Addr) -> Self {
        // Ipv4Addr orders by its octets
        let (lower, upper) = ordered(a, b);
        FlowKey::Ipv4 { lower, upper }
    }
}
fn ordered<T: Ord>(a: T, b: T) -> (T, T) {
    if a <= b { (a, b) } else { (b, a) }
}
impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKey::Mac { lower, upper } => write!(f, "{lower}_{upper}"),
            FlowKey::Ipv4 { lower, upper } => write!(f, "{lower}_{upper}"),
        }
    }
}
