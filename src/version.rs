use crate::byte_order::{ByteOrder, SliceByteOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}
impl Version {
    /// The version written by libpcap since 1998
    pub const PCAP_VERSION_2_4: Version = Version { major: 2, minor: 4 };
    /// Parses the version from the bytes
    #[inline(always)]
    pub(crate) fn parse(bytes: &[u8], byte_order: impl ByteOrder) -> Self {
        let major = byte_order.u16_at(bytes, 0);
        let minor = byte_order.u16_at(bytes, 2);
        Self { major, minor }
    }
}
impl Default for Version {
    fn default() -> Self {
        Self::PCAP_VERSION_2_4
    }
}
impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
