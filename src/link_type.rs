//! Link layer header types stored in the `network` field of the file header
//!
//! [Source](https://www.tcpdump.org/linktypes.html)
use thiserror::Error;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unknown link type: {0}")]
pub struct InvalidLinkType(pub u32);
macro_rules! link_type {
    (
        $(
            $(#[$docs:meta])*
            $name:ident = $value:literal
        ),*
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum LinkType {
            $(
                $(#[$docs])*
                $name = $value,
            )*
        }
        impl LinkType {
            /// The raw value written to the file header
            pub const fn value(self) -> u32 {
                self as u32
            }
            pub const fn name(self) -> &'static str {
                match self {
                    $(
                        LinkType::$name => stringify!($name),
                    )*
                }
            }
        }

        impl TryFrom<u32> for LinkType {
            type Error = InvalidLinkType;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $(
                        $value => Ok(LinkType::$name),
                    )*
                    _ => Err(InvalidLinkType(value)),
                }
            }
        }
    };
}
link_type! {
    /// BSD loopback encapsulation
    Null = 0,
    /// IEEE 802.3 Ethernet
    Ethernet = 1,
    Ax25 = 3,
    Ieee802_5 = 6,
    Slip = 8,
    Ppp = 9,
    Fddi = 10,
    PppHdlc = 50,
    PppEther = 51,
    AtmRfc1483 = 100,
    /// Raw IP, version given by the first nibble
    Raw = 101,
    CHdlc = 104,
    Ieee802_11 = 105,
    Frelay = 107,
    Loop = 108,
    LinuxSll = 113,
    Pflog = 117,
    Ieee802_11Radiotap = 127,
    UsbLinux = 189,
    Ppi = 192,
    Ipnet = 226,
    CanSocketcan = 227,
    /// Raw IPv4
    Ipv4 = 228,
    /// Raw IPv6
    Ipv6 = 229,
    Nflog = 239,
    UsbPcap = 249,
    Netlink = 253,
    LinuxSll2 = 276
}
