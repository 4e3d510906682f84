//! [`PortType`]: the TCP/UDP distinction carried by every mapping request
//! (spec.md §3).

use crate::error::{invalid_argument, Error};
use std::fmt;

/// The transport protocol a mapping applies to.
///
/// Exposes the IANA protocol number each variant corresponds to: 6 for TCP,
/// 17 for UDP (spec.md §3, §GLOSSARY).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortType {
    Tcp,
    Udp,
}

impl PortType {
    /// The IANA-assigned protocol number for this port type.
    pub const fn iana_number(self) -> u8 {
        match self {
            Self::Tcp => 6,
            Self::Udp => 17,
        }
    }

    /// Decode an IANA protocol number, if it names TCP or UDP.
    ///
    /// PCP's MAP/PEER opcodes also accept the special value `0` ("all
    /// protocols"); that case is represented as `None` rather than rejected,
    /// since it isn't a `PortType` at all.
    pub fn from_iana_number(n: u8) -> Option<Self> {
        match n {
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            _ => None,
        }
    }

    /// Validate and decode a protocol number for a context that requires a
    /// concrete TCP/UDP value (UPnP actions, NAT-PMP opcodes): `0` and any
    /// value outside `[1, 255]` covering an unknown transport is rejected
    /// with `InvalidArgument`, per spec.md §8.
    pub fn require_from_iana_number(n: u8) -> Result<Self, Error> {
        Self::from_iana_number(n).ok_or_else(|| invalid_argument(format!("protocol number {n} is not TCP or UDP")))
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iana_numbers() {
        assert_eq!(PortType::Tcp.iana_number(), 6);
        assert_eq!(PortType::Udp.iana_number(), 17);
    }

    #[test]
    fn roundtrip() {
        assert_eq!(PortType::from_iana_number(6), Some(PortType::Tcp));
        assert_eq!(PortType::from_iana_number(17), Some(PortType::Udp));
        assert_eq!(PortType::from_iana_number(0), None);
        assert_eq!(PortType::from_iana_number(1), None);
    }

    #[test]
    fn rejects_zero_protocol() {
        assert!(PortType::require_from_iana_number(0).is_err());
    }
}
