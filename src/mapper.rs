//! A discovered candidate gateway, ready to attempt a mapping against
//! (spec.md §4.6).

use crate::upnp::ControlEndpoint;
use std::fmt;
use std::net::SocketAddr;

/// One mapper discovery produced for a gateway (spec.md §4.6 step 4: "the
/// union of constructed mappers"). Selection tries these in a fixed order
/// (spec.md §4.6 "Selection"): PCP, then NAT-PMP, then IGD v4, then the IGD
/// v6 firewall-pinhole profile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mapper {
    /// PCP supersedes NAT-PMP; the same daemon answers both on the same
    /// port, so this variant is always tried first (spec.md §4.6 step 3).
    Pcp { addr: SocketAddr },
    NatPmp { addr: SocketAddr },
    /// An IGD:1/IGD:2 WAN (PPP or IP) connection service.
    IgdV4 { endpoint: ControlEndpoint },
    /// An IGD:2 IPv6 firewall-pinhole control service.
    IgdV6Pinhole { endpoint: ControlEndpoint },
}

impl Mapper {
    /// The fixed selection priority spec.md §4.6 assigns this mapper's kind:
    /// lower sorts first.
    pub fn selection_priority(&self) -> u8 {
        match self {
            Self::Pcp { .. } => 0,
            Self::NatPmp { .. } => 1,
            Self::IgdV4 { .. } => 2,
            Self::IgdV6Pinhole { .. } => 3,
        }
    }
}

impl fmt::Display for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pcp { addr } => write!(f, "PCP@{addr}"),
            Self::NatPmp { addr } => write!(f, "NAT-PMP@{addr}"),
            Self::IgdV4 { endpoint } => write!(f, "IGD-v4@{}{}", endpoint.host, endpoint.control_path),
            Self::IgdV6Pinhole { endpoint } => write!(f, "IGD-v6-pinhole@{}{}", endpoint.host, endpoint.control_path),
        }
    }
}

/// Sorts `mappers` into spec.md §4.6's selection order, in place.
pub fn sort_by_selection_priority(mappers: &mut [Mapper]) {
    mappers.sort_by_key(Mapper::selection_priority);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_order_is_pcp_then_natpmp_then_igd() {
        let mut mappers = vec![
            Mapper::IgdV6Pinhole { endpoint: ControlEndpoint { host: "h".into(), control_path: "/p".into(), service_type: "s".into() } },
            Mapper::NatPmp { addr: "192.168.1.1:5351".parse().unwrap() },
            Mapper::IgdV4 { endpoint: ControlEndpoint { host: "h".into(), control_path: "/p".into(), service_type: "s".into() } },
            Mapper::Pcp { addr: "192.168.1.1:5351".parse().unwrap() },
        ];
        sort_by_selection_priority(&mut mappers);
        assert!(matches!(mappers[0], Mapper::Pcp { .. }));
        assert!(matches!(mappers[1], Mapper::NatPmp { .. }));
        assert!(matches!(mappers[2], Mapper::IgdV4 { .. }));
        assert!(matches!(mappers[3], Mapper::IgdV6Pinhole { .. }));
    }
}
