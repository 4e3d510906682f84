//! PCP requests and responses: common header + opcode-specific body +
//! options (spec.md §3, §4.3).

use super::body::{MapBody, PeerBody};
use super::header::{RequestHeader, ResponseHeader, HEADER_LEN, MAX_PACKET_SIZE};
use super::nonce::MappingNonce;
use super::opcode::OpCode;
use super::option::{decode_options, encode_options, PcpOption};
use super::result_code::ResultCode;
use crate::codec::{Reader, Writer};
use crate::error::{invalid_argument, non_null_address, Error};
use crate::protocol::PortType;
use std::net::Ipv6Addr;

/// A PCP request, immutable once constructed (spec.md "Lifecycles").
#[derive(Clone, Debug, PartialEq)]
pub enum PcpRequest {
    Announce { header: RequestHeader },
    Map { header: RequestHeader, body: MapBody, options: Vec<PcpOption> },
    Peer { header: RequestHeader, body: PeerBody, options: Vec<PcpOption> },
}

impl PcpRequest {
    pub fn opcode(&self) -> OpCode {
        match self {
            Self::Announce { .. } => OpCode::Announce,
            Self::Map { .. } => OpCode::Map,
            Self::Peer { .. } => OpCode::Peer,
        }
    }

    pub fn header(&self) -> &RequestHeader {
        match self {
            Self::Announce { header } | Self::Map { header, .. } | Self::Peer { header, .. } => header,
        }
    }

    /// Constructs an ANNOUNCE request (spec.md §3: no body, no options).
    pub fn announce(client_ip: Ipv6Addr) -> Result<Self, Error> {
        non_null_address(crate::codec::from_wire_ipv6(client_ip), "client IP")?;
        Ok(Self::Announce { header: RequestHeader { opcode: OpCode::Announce, lifetime: 0, client_ip } })
    }

    /// Constructs a MAP request, validating per spec.md §4.3.
    pub fn map(
        client_ip: Ipv6Addr,
        lifetime: u32,
        nonce: MappingNonce,
        protocol: PortType,
        internal_port: u16,
        suggested_external_port: u16,
        suggested_external_ip: Ipv6Addr,
        options: Vec<PcpOption>,
    ) -> Result<Self, Error> {
        if internal_port == 0 {
            return Err(invalid_argument("internal port must not be 0"));
        }
        for opt in &options {
            if !OpCode::Map.valid_option(opt.code()) {
                return Err(invalid_argument(format!("option {:?} is not valid for MAP", opt.code())));
            }
        }
        let header = RequestHeader { opcode: OpCode::Map, lifetime, client_ip };
        let body = MapBody {
            nonce,
            protocol,
            internal_port,
            external_port: suggested_external_port,
            external_ip: suggested_external_ip,
        };
        Ok(Self::Map { header, body, options })
    }

    /// Constructs a PEER request, validating per spec.md §4.3.
    pub fn peer(
        client_ip: Ipv6Addr,
        lifetime: u32,
        nonce: MappingNonce,
        protocol: PortType,
        internal_port: u16,
        suggested_external_port: u16,
        suggested_external_ip: Ipv6Addr,
        remote_port: u16,
        remote_ip: Ipv6Addr,
        options: Vec<PcpOption>,
    ) -> Result<Self, Error> {
        if internal_port == 0 {
            return Err(invalid_argument("internal port must not be 0"));
        }
        if remote_port == 0 {
            return Err(invalid_argument("remote peer port must not be 0"));
        }
        for opt in &options {
            if !OpCode::Peer.valid_option(opt.code()) {
                return Err(invalid_argument(format!("option {:?} is not valid for PEER", opt.code())));
            }
        }
        let header = RequestHeader { opcode: OpCode::Peer, lifetime, client_ip };
        let map = MapBody {
            nonce,
            protocol,
            internal_port,
            external_port: suggested_external_port,
            external_ip: suggested_external_ip,
        };
        let body = PeerBody { map, remote_port, remote_ip };
        Ok(Self::Peer { header, body, options })
    }

    pub fn dump(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(HEADER_LEN);
        match self {
            Self::Announce { header } => {
                header.encode(&mut w);
            }
            Self::Map { header, body, options } => {
                header.encode(&mut w);
                body.encode(&mut w);
                encode_options(options, &mut w);
            }
            Self::Peer { header, body, options } => {
                header.encode(&mut w);
                body.encode(&mut w);
                encode_options(options, &mut w);
            }
        }
        w.into_vec()
    }

    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() > MAX_PACKET_SIZE {
            return Err(Error::MalformedPacket(format!("PCP packet of {} bytes exceeds {MAX_PACKET_SIZE}", buf.len())));
        }
        let mut r = Reader::new(buf);
        let header = RequestHeader::decode(&mut r)?;
        Ok(match header.opcode {
            OpCode::Announce => Self::Announce { header },
            OpCode::Map => {
                let body = MapBody::decode(&mut r)?;
                let options = decode_options(&mut r, |o| OpCode::Map.valid_option(o.code()))?;
                Self::Map { header, body, options }
            }
            OpCode::Peer => {
                let body = PeerBody::decode(&mut r)?;
                let options = decode_options(&mut r, |o| OpCode::Peer.valid_option(o.code()))?;
                Self::Peer { header, body, options }
            }
        })
    }
}

/// A PCP response, immutable once constructed (spec.md "Lifecycles").
#[derive(Clone, Debug, PartialEq)]
pub enum PcpResponse {
    Announce { header: ResponseHeader },
    Map { header: ResponseHeader, body: MapBody, options: Vec<PcpOption> },
    Peer { header: ResponseHeader, body: PeerBody, options: Vec<PcpOption> },
}

impl PcpResponse {
    pub fn header(&self) -> &ResponseHeader {
        match self {
            Self::Announce { header } | Self::Map { header, .. } | Self::Peer { header, .. } => header,
        }
    }

    pub fn result_code(&self) -> ResultCode {
        self.header().result_code
    }

    pub fn dump(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(HEADER_LEN);
        match self {
            Self::Announce { header } => {
                header.encode(&mut w);
            }
            Self::Map { header, body, options } => {
                header.encode(&mut w);
                body.encode(&mut w);
                encode_options(options, &mut w);
            }
            Self::Peer { header, body, options } => {
                header.encode(&mut w);
                body.encode(&mut w);
                encode_options(options, &mut w);
            }
        }
        w.into_vec()
    }

    /// Parses a response buffer, verifying the opcode matches `expected`
    /// (spec.md §4.3's `UnexpectedOpcode` check).
    pub fn parse(buf: &[u8], expected: OpCode) -> Result<Self, Error> {
        if buf.len() < HEADER_LEN {
            return Err(Error::MalformedPacket(format!(
                "PCP response of {} bytes is shorter than the {HEADER_LEN}-byte header",
                buf.len()
            )));
        }
        if buf.len() > MAX_PACKET_SIZE {
            return Err(Error::MalformedPacket(format!("PCP packet of {} bytes exceeds {MAX_PACKET_SIZE}", buf.len())));
        }
        let mut r = Reader::new(buf);
        let header = ResponseHeader::decode(&mut r, expected)?;
        Ok(match header.opcode {
            OpCode::Announce => Self::Announce { header },
            OpCode::Map => {
                let body = MapBody::decode(&mut r)?;
                let options = decode_options(&mut r, |o| OpCode::Map.valid_option(o.code()))?;
                Self::Map { header, body, options }
            }
            OpCode::Peer => {
                let body = PeerBody::decode(&mut r)?;
                let options = decode_options(&mut r, |o| OpCode::Peer.valid_option(o.code()))?;
                Self::Peer { header, body, options }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_request_roundtrips() {
        let req = PcpRequest::map(
            "::ffff:10.0.0.1".parse().unwrap(),
            3600,
            MappingNonce::random(),
            PortType::Tcp,
            1001,
            50000,
            crate::codec::v4_wildcard(),
            vec![PcpOption::PreferFailure],
        )
        .unwrap();
        let buf = req.dump();
        assert_eq!(PcpRequest::parse(&buf).unwrap(), req);
    }

    #[test]
    fn map_request_rejects_option_invalid_for_opcode() {
        let err = PcpRequest::peer(
            "::ffff:10.0.0.1".parse().unwrap(),
            3600,
            MappingNonce::random(),
            PortType::Tcp,
            1001,
            50000,
            crate::codec::v4_wildcard(),
            443,
            "::ffff:8.8.8.8".parse().unwrap(),
            vec![PcpOption::Filter { prefix_length: 128, remote_port: 0, remote_ip: Ipv6Addr::UNSPECIFIED }],
        );
        assert!(err.is_err());
    }

    #[test]
    fn announce_request_rejects_unspecified_client_ip() {
        assert!(PcpRequest::announce(Ipv6Addr::UNSPECIFIED).is_err());
    }

    /// spec.md §8, end-to-end scenario 5: a literal PCP PEER response.
    #[test]
    fn peer_response_parses_literal_scenario() {
        let mut w = Writer::with_capacity(HEADER_LEN);
        w.u8(2); // version
        w.u8(OpCode::Peer.as_u8() | 0x80);
        w.reserved(1);
        w.u8(ResultCode::Success.as_u8());
        w.u32(3600);
        w.u32(12345);
        w.reserved(12);
        // body
        let nonce: [u8; 12] = (0..12).collect::<Vec<u8>>().try_into().unwrap();
        w.bytes(&nonce);
        w.u8(PortType::Tcp.iana_number());
        w.reserved(3);
        w.u16(1001);
        w.u16(50000);
        w.ipv6("::ffff:2.3.4.5".parse().unwrap());
        w.u16(443);
        w.reserved(2);
        w.ipv6("::ffff:8.8.8.8".parse().unwrap());

        let buf = w.into_vec();
        let resp = PcpResponse::parse(&buf, OpCode::Peer).unwrap();
        match resp {
            PcpResponse::Peer { header, body, options } => {
                assert_eq!(header.lifetime, 3600);
                assert_eq!(header.epoch_time, 12345);
                assert_eq!(header.result_code, ResultCode::Success);
                assert_eq!(body.map.nonce.as_bytes(), &nonce);
                assert_eq!(body.map.protocol, PortType::Tcp);
                assert_eq!(body.map.internal_port, 1001);
                assert_eq!(body.map.external_port, 50000);
                assert_eq!(body.map.external_ip, "::ffff:2.3.4.5".parse::<Ipv6Addr>().unwrap());
                assert_eq!(body.remote_port, 443);
                assert_eq!(body.remote_ip, "::ffff:8.8.8.8".parse::<Ipv6Addr>().unwrap());
                assert!(options.is_empty());
            }
            _ => panic!("expected a PEER response"),
        }
    }

    #[test]
    fn response_rejects_opcode_mismatch() {
        let mut w = Writer::with_capacity(HEADER_LEN);
        w.u8(2);
        w.u8(OpCode::Map.as_u8() | 0x80);
        w.reserved(1);
        w.u8(ResultCode::Success.as_u8());
        w.u32(0);
        w.u32(0);
        w.reserved(12);
        MapBody {
            nonce: MappingNonce::random(),
            protocol: PortType::Tcp,
            internal_port: 1,
            external_port: 1,
            external_ip: Ipv6Addr::UNSPECIFIED,
        }
        .encode(&mut w);
        let buf = w.into_vec();
        assert!(matches!(PcpResponse::parse(&buf, OpCode::Peer), Err(Error::UnexpectedOpcode { .. })));
    }

    #[test]
    fn response_rejects_oversized_packet() {
        let buf = vec![0u8; MAX_PACKET_SIZE + 1];
        assert!(PcpResponse::parse(&buf, OpCode::Map).is_err());
    }
}
