//! MAP and PEER opcode bodies (RFC 6887 §11/§12, spec.md §3).

use super::nonce::MappingNonce;
use crate::codec::{Reader, Writer};
use crate::error::{invalid_argument, Error};
use crate::protocol::PortType;
use std::net::Ipv6Addr;

/// Fields shared by a MAP request/response body (36 bytes on the wire).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapBody {
    pub nonce: MappingNonce,
    pub protocol: PortType,
    pub internal_port: u16,
    /// Suggested (request) or assigned (response) external port. `0` is a
    /// valid wildcard on the request side only (spec.md §4.3).
    pub external_port: u16,
    pub external_ip: Ipv6Addr,
}

pub const MAP_BODY_LEN: usize = 36;

impl MapBody {
    pub fn encode(&self, w: &mut Writer) {
        w.bytes(self.nonce.as_bytes());
        w.u8(self.protocol.iana_number());
        w.reserved(3);
        w.u16(self.internal_port);
        w.u16(self.external_port);
        w.ipv6(self.external_ip);
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let nonce = MappingNonce::from_bytes(r.array::<12>()?);
        let protocol = PortType::require_from_iana_number(r.u8()?)?;
        r.skip(3)?;
        let internal_port = r.u16()?;
        let external_port = r.u16()?;
        let external_ip = r.ipv6()?;
        Ok(Self { nonce, protocol, internal_port, external_port, external_ip })
    }

    /// Validates a request-side body per spec.md §4.3: internal port must be
    /// non-zero; external port `0` is the documented wildcard.
    pub fn validate_request(&self) -> Result<(), Error> {
        if self.internal_port == 0 {
            return Err(invalid_argument("internal port must not be 0"));
        }
        Ok(())
    }
}

/// Fields shared by a PEER request/response body: a [`MapBody`] plus the
/// remote peer's port and address (56 bytes on the wire).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerBody {
    pub map: MapBody,
    pub remote_port: u16,
    pub remote_ip: Ipv6Addr,
}

pub const PEER_BODY_LEN: usize = MAP_BODY_LEN + 20;

impl PeerBody {
    pub fn encode(&self, w: &mut Writer) {
        self.map.encode(w);
        w.u16(self.remote_port);
        w.reserved(2);
        w.ipv6(self.remote_ip);
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let map = MapBody::decode(r)?;
        let remote_port = r.u16()?;
        r.skip(2)?;
        let remote_ip = r.ipv6()?;
        Ok(Self { map, remote_port, remote_ip })
    }

    pub fn validate_request(&self) -> Result<(), Error> {
        self.map.validate_request()?;
        if self.remote_port == 0 {
            return Err(invalid_argument("remote peer port must not be 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> MapBody {
        MapBody {
            nonce: MappingNonce::from_bytes([1; 12]),
            protocol: PortType::Tcp,
            internal_port: 1001,
            external_port: 50000,
            external_ip: "::ffff:2.3.4.5".parse().unwrap(),
        }
    }

    #[test]
    fn map_body_roundtrips() {
        let body = sample_map();
        let mut w = Writer::default();
        body.encode(&mut w);
        assert_eq!(w.len(), MAP_BODY_LEN);
        let mut r = Reader::new(w.as_slice());
        assert_eq!(MapBody::decode(&mut r).unwrap(), body);
    }

    #[test]
    fn peer_body_roundtrips() {
        let body = PeerBody { map: sample_map(), remote_port: 443, remote_ip: "::ffff:8.8.8.8".parse().unwrap() };
        let mut w = Writer::default();
        body.encode(&mut w);
        assert_eq!(w.len(), PEER_BODY_LEN);
        let mut r = Reader::new(w.as_slice());
        assert_eq!(PeerBody::decode(&mut r).unwrap(), body);
    }

    #[test]
    fn map_request_rejects_zero_internal_port() {
        let mut body = sample_map();
        body.internal_port = 0;
        assert!(body.validate_request().is_err());
    }
}
