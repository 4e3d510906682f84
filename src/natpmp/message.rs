//! NAT-PMP (RFC 6886) request/response wire format.
//!
//! Grounded on the fixed-size layouts in
//! `other_examples/1112d472_fengyc-natpmp__src-lib.rs.rs` and
//! `other_examples/df493094_XAMPPRocky-natpmp__src-asynchronous.rs.rs`,
//! recast into this crate's `Reader`/`Writer` codec instead of raw byte
//! indexing, and into a `dump`/`parse` pair matching the PCP message shape
//! (spec.md §3).

use crate::codec::{Reader, Writer};
use crate::error::{invalid_argument, Error};
use crate::protocol::PortType;
use std::net::Ipv4Addr;

pub const NATPMP_VERSION: u8 = 0;

/// Result codes defined by RFC 6886 §3.5. Unlike PCP, this field is 16 bits
/// wide on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NatPmpResultCode {
    Success,
    UnsuppVersion,
    NotAuthorized,
    NetworkFailure,
    OutOfResources,
    UnsuppOpcode,
}

impl NatPmpResultCode {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Self::Success => 0,
            Self::UnsuppVersion => 1,
            Self::NotAuthorized => 2,
            Self::NetworkFailure => 3,
            Self::OutOfResources => 4,
            Self::UnsuppOpcode => 5,
        }
    }
}

impl TryFrom<u16> for NatPmpResultCode {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self, Error> {
        Ok(match code {
            0 => Self::Success,
            1 => Self::UnsuppVersion,
            2 => Self::NotAuthorized,
            3 => Self::NetworkFailure,
            4 => Self::OutOfResources,
            5 => Self::UnsuppOpcode,
            n => return Err(Error::MalformedPacket(format!("unknown NAT-PMP result code {n}"))),
        })
    }
}

/// A NAT-PMP request opcode's raw value: `0` queries the external address,
/// `1`/`2` create a UDP/TCP mapping (RFC 6886 §3.3).
fn opcode_for(kind: RequestKind) -> u8 {
    match kind {
        RequestKind::ExternalAddress => 0,
        RequestKind::Map(PortType::Udp) => 1,
        RequestKind::Map(PortType::Tcp) => 2,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RequestKind {
    ExternalAddress,
    Map(PortType),
}

/// A NAT-PMP request: either a query for the external address, or a port
/// mapping request (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NatPmpRequest {
    ExternalAddress,
    Map { protocol: PortType, internal_port: u16, suggested_external_port: u16, lifetime: u32 },
}

impl NatPmpRequest {
    /// Constructs a `Map` request, validating per spec.md §4.3: internal
    /// port must be non-zero; external port `0` requests any port.
    pub fn map(protocol: PortType, internal_port: u16, suggested_external_port: u16, lifetime: u32) -> Result<Self, Error> {
        if internal_port == 0 {
            return Err(invalid_argument("internal port must not be 0"));
        }
        Ok(Self::Map { protocol, internal_port, suggested_external_port, lifetime })
    }

    fn kind(&self) -> RequestKind {
        match self {
            Self::ExternalAddress => RequestKind::ExternalAddress,
            Self::Map { protocol, .. } => RequestKind::Map(*protocol),
        }
    }

    pub fn dump(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(12);
        w.u8(NATPMP_VERSION);
        w.u8(opcode_for(self.kind()));
        match self {
            Self::ExternalAddress => {}
            Self::Map { internal_port, suggested_external_port, lifetime, .. } => {
                w.reserved(2);
                w.u16(*internal_port);
                w.u16(*suggested_external_port);
                w.u32(*lifetime);
            }
        }
        w.into_vec()
    }

    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(buf);
        let version = r.u8()?;
        if version != NATPMP_VERSION {
            return Err(Error::MalformedPacket(format!("unsupported NAT-PMP version {version}")));
        }
        let opcode = r.u8()?;
        Ok(match opcode {
            0 => Self::ExternalAddress,
            1 | 2 => {
                r.skip(2)?;
                let internal_port = r.u16()?;
                let suggested_external_port = r.u16()?;
                let lifetime = r.u32()?;
                let protocol = if opcode == 1 { PortType::Udp } else { PortType::Tcp };
                Self::Map { protocol, internal_port, suggested_external_port, lifetime }
            }
            n => return Err(Error::MalformedPacket(format!("unknown NAT-PMP request opcode {n}"))),
        })
    }
}

/// A NAT-PMP response: a gateway's external address, or a mapping result
/// (spec.md §3). The response's opcode carries the 0x80 bit RFC 6886 §3.5
/// reserves to mark it as a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NatPmpResponse {
    ExternalAddress { result_code: NatPmpResultCode, epoch: u32, external_ip: Ipv4Addr },
    Map { protocol: PortType, result_code: NatPmpResultCode, epoch: u32, internal_port: u16, external_port: u16, lifetime: u32 },
}

impl NatPmpResponse {
    pub fn result_code(&self) -> NatPmpResultCode {
        match self {
            Self::ExternalAddress { result_code, .. } | Self::Map { result_code, .. } => *result_code,
        }
    }

    pub fn dump(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(16);
        w.u8(NATPMP_VERSION);
        match self {
            Self::ExternalAddress { result_code, epoch, external_ip } => {
                w.u8(0x80);
                w.u16(result_code.as_u16());
                w.u32(*epoch);
                w.bytes(&external_ip.octets());
            }
            Self::Map { protocol, result_code, epoch, internal_port, external_port, lifetime } => {
                w.u8(0x80 | if *protocol == PortType::Udp { 1 } else { 2 });
                w.u16(result_code.as_u16());
                w.u32(*epoch);
                w.u16(*internal_port);
                w.u16(*external_port);
                w.u32(*lifetime);
            }
        }
        w.into_vec()
    }

    /// Parses a response buffer. `expected_opcode` is the raw request opcode
    /// (without the 0x80 bit) the caller is awaiting a match for.
    pub fn parse(buf: &[u8], expected_opcode: u8) -> Result<Self, Error> {
        let mut r = Reader::new(buf);
        let version = r.u8()?;
        if version != NATPMP_VERSION {
            return Err(Error::MalformedPacket(format!("unsupported NAT-PMP version {version}")));
        }
        let opcode_byte = r.u8()?;
        if opcode_byte & 0x80 == 0 {
            return Err(Error::MalformedPacket("NAT-PMP response is missing the 0x80 opcode bit".into()));
        }
        let opcode = opcode_byte & 0x7f;
        if opcode != expected_opcode {
            return Err(Error::UnexpectedOpcode { expected: expected_opcode, got: opcode });
        }
        let result_code = NatPmpResultCode::try_from(r.u16()?)?;
        let epoch = r.u32()?;
        Ok(match opcode {
            0 => {
                let octets = r.array::<4>()?;
                Self::ExternalAddress { result_code, epoch, external_ip: Ipv4Addr::from(octets) }
            }
            1 | 2 => {
                let internal_port = r.u16()?;
                let external_port = r.u16()?;
                let lifetime = r.u32()?;
                let protocol = if opcode == 1 { PortType::Udp } else { PortType::Tcp };
                Self::Map { protocol, result_code, epoch, internal_port, external_port, lifetime }
            }
            n => return Err(Error::MalformedPacket(format!("unknown NAT-PMP response opcode {n}"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_address_request_roundtrips() {
        let req = NatPmpRequest::ExternalAddress;
        let buf = req.dump();
        assert_eq!(buf.len(), 2);
        assert_eq!(NatPmpRequest::parse(&buf).unwrap(), req);
    }

    #[test]
    fn map_request_roundtrips() {
        let req = NatPmpRequest::map(PortType::Udp, 14020, 14020, 3600).unwrap();
        let buf = req.dump();
        assert_eq!(buf.len(), 12);
        assert_eq!(NatPmpRequest::parse(&buf).unwrap(), req);
    }

    #[test]
    fn map_request_rejects_zero_internal_port() {
        assert!(NatPmpRequest::map(PortType::Tcp, 0, 0, 0).is_err());
    }

    #[test]
    fn map_response_roundtrips() {
        let resp = NatPmpResponse::Map {
            protocol: PortType::Tcp,
            result_code: NatPmpResultCode::Success,
            epoch: 42,
            internal_port: 14020,
            external_port: 14020,
            lifetime: 3600,
        };
        let buf = resp.dump();
        assert_eq!(buf.len(), 16);
        assert_eq!(NatPmpResponse::parse(&buf, 2).unwrap(), resp);
    }

    #[test]
    fn external_address_response_roundtrips() {
        let resp = NatPmpResponse::ExternalAddress {
            result_code: NatPmpResultCode::Success,
            epoch: 42,
            external_ip: Ipv4Addr::new(203, 0, 113, 1),
        };
        let buf = resp.dump();
        assert_eq!(buf.len(), 12);
        assert_eq!(NatPmpResponse::parse(&buf, 0).unwrap(), resp);
    }

    #[test]
    fn response_rejects_missing_response_bit() {
        let mut req = NatPmpRequest::ExternalAddress.dump();
        req.resize(12, 0);
        assert!(NatPmpResponse::parse(&req, 0).is_err());
    }

    #[test]
    fn response_rejects_opcode_mismatch() {
        let resp = NatPmpResponse::ExternalAddress {
            result_code: NatPmpResultCode::Success,
            epoch: 0,
            external_ip: Ipv4Addr::UNSPECIFIED,
        };
        let buf = resp.dump();
        assert!(matches!(NatPmpResponse::parse(&buf, 1), Err(Error::UnexpectedOpcode { .. })));
    }
}
