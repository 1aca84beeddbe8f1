use std::fmt;

use crate::protocols::{FlowKey, TruncatedFrame};

pub const ETHERNET_HEADER_SIZE: usize = 14;
pub const ETHERNET_CRC_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress(pub [u8; 6]);
impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

macro_rules! ethertype {
    (
        $(
            $name:ident = $value:literal => $protocol:literal
        ),*
    ) => {
        /// Well known values of the Ethernet type field
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Ethertype {
            $(
                #[doc = $protocol]
                $name = $value,
            )*
        }
        impl Ethertype {
            pub const fn value(self) -> u16 {
                self as u16
            }
            /// Human readable protocol name
            pub const fn protocol(self) -> &'static str {
                match self {
                    $(
                        Ethertype::$name => $protocol,
                    )*
                }
            }
            pub fn from_value(value: u16) -> Option<Self> {
                match value {
                    $(
                        $value => Some(Ethertype::$name),
                    )*
                    _ => None,
                }
            }
            pub fn from_protocol(protocol: &str) -> Option<Self> {
                match protocol {
                    $(
                        $protocol => Some(Ethertype::$name),
                    )*
                    _ => None,
                }
            }
        }
    };
}
ethertype! {
    Ipv4 = 0x0800 => "IPv4",
    Arp = 0x0806 => "ARP",
    WakeOnLan = 0x0842 => "Wake-on-LAN",
    Trill = 0x22F3 => "IETF TRILL Protocol",
    DecnetPhaseIv = 0x6003 => "DECnet Phase IV",
    ReverseArp = 0x8035 => "Reverse ARP",
    AppleTalk = 0x809B => "Apple Talk",
    AppleTalkArp = 0x80F3 => "Apple Talk ARP",
    VlanTagged = 0x8100 => "VLAN-tagged Frame",
    Ipx = 0x8137 => "IPX",
    QnxQnet = 0x8204 => "QNX Qnet",
    Ipv6 = 0x86DD => "IPv6",
    FlowControl = 0x8808 => "Ethernet Flow Control",
    CobraNet = 0x8819 => "CobraNet",
    MplsUnicast = 0x8847 => "MPLS Unicast",
    MplsMulticast = 0x8848 => "MPLS Multicast",
    PppoeDiscovery = 0x8863 => "PPPoE Discovery",
    PppoeSession = 0x8864 => "PPPoE Session",
    EtherCat = 0x88A4 => "EtherCAT",
    Lldp = 0x88CC => "LLDP",
    Ptp = 0x88F7 => "PTP",
    Prp = 0x88FB => "PRP",
    Fcoe = 0x8906 => "Fiber Channel over Ethernet",
    ConfigurationTesting = 0x9000 => "Ethernet Configuration Testing Protocol"
}

/// An Ethernet II frame as captured, including the trailing frame check sequence
///
/// [Layout](https://en.wikipedia.org/wiki/Ethernet_frame)
#[derive(Debug, Clone, Copy)]
pub struct EthernetFrame<'a> {
    data: &'a [u8],
}
impl<'a> EthernetFrame<'a> {
    /// Requires at least the 14 byte header
    pub fn new(data: &'a [u8]) -> Result<Self, TruncatedFrame> {
        if data.len() < ETHERNET_HEADER_SIZE {
            return Err(TruncatedFrame {
                protocol: "Ethernet",
                needed: ETHERNET_HEADER_SIZE,
                got: data.len(),
            });
        }
        Ok(Self { data })
    }
    pub fn destination(&self) -> MacAddress {
        MacAddress(mac_at(self.data, 0))
    }
    pub fn source(&self) -> MacAddress {
        MacAddress(mac_at(self.data, 6))
    }
    pub fn ethertype_bytes(&self) -> [u8; 2] {
        [self.data[12], self.data[13]]
    }
    pub fn ethertype_value(&self) -> u16 {
        u16::from_be_bytes(self.ethertype_bytes())
    }
    /// `None` for values outside the catalogue
    pub fn ethertype(&self) -> Option<Ethertype> {
        Ethertype::from_value(self.ethertype_value())
    }
    /// Everything between the header and the frame check sequence
    pub fn payload(&self) -> &'a [u8] {
        let end = self.data.len().saturating_sub(ETHERNET_CRC_SIZE);
        self.data.get(ETHERNET_HEADER_SIZE..end).unwrap_or_default()
    }
    /// The last four bytes, when the frame is long enough to hold them after the header
    pub fn crc_bytes(&self) -> Option<&'a [u8]> {
        let data = self.data;
        let start = data.len().checked_sub(ETHERNET_CRC_SIZE)?;
        (start >= ETHERNET_HEADER_SIZE).then(|| &data[start..])
    }
    pub fn flow_key(&self) -> FlowKey {
        FlowKey::mac_pair(self.destination(), self.source())
    }
}
fn mac_at(data: &[u8], offset: usize) -> [u8; 6] {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&data[offset..offset + 6]);
    mac
}
