//! The PCP option TLV codec (spec.md §4.2).
//!
//! On the wire: `code (u8) | reserved (u8) | length (u16) | value (length
//! bytes) | zero-padding to a 4-byte boundary`. Unknown codes decode to
//! `Unknown` rather than being discarded, and options preserve construction
//! order on the wire, per spec.md §4.2 ("some servers rely on it").
//!
//! Grounded on the teacher's `Filter`/`ThirdParty`/`PreferFailure` option
//! shape (`src/core/option.rs`), extended with the `Description`, `NextHop`
//! and `PortReservation` variants spec.md's data model adds.

use super::option_code::OptionCode;
use crate::codec::{Reader, Writer};
use crate::error::{invalid_argument, Error};
use std::net::Ipv6Addr;

pub const OPTION_HEADER_LEN: usize = 4;

/// A single PCP option, in its decoded, owned form.
#[derive(Clone, Debug, PartialEq)]
pub enum PcpOption {
    /// Informs the server this request is made on behalf of `internal_ip`.
    ThirdParty(Ipv6Addr),
    /// Tells the server to fail rather than substitute an alternative
    /// external address/port.
    PreferFailure,
    /// Restricts which remote peer may use the mapping.
    Filter { prefix_length: u8, remote_port: u16, remote_ip: Ipv6Addr },
    /// A free-text annotation for the mapping, shown in router admin UIs.
    Description(String),
    /// Suggests the next-hop router the server should use for this mapping.
    NextHop(Ipv6Addr),
    /// A bulk reservation of additional external ports alongside the
    /// primary one.
    PortReservation(Vec<u16>),
    /// An option code this crate doesn't recognize; its payload is
    /// preserved unparsed rather than being dropped.
    Unknown { code: u8, payload: Vec<u8> },
}

impl PcpOption {
    pub fn code(&self) -> OptionCode {
        match self {
            Self::ThirdParty(_) => OptionCode::ThirdParty,
            Self::PreferFailure => OptionCode::PreferFailure,
            Self::Filter { .. } => OptionCode::Filter,
            Self::Description(_) => OptionCode::Description,
            Self::NextHop(_) => OptionCode::NextHop,
            Self::PortReservation(_) => OptionCode::PortReservation,
            Self::Unknown { code, .. } => OptionCode::Unknown(*code),
        }
    }

    /// Length of the option's *payload*, not including the 4-byte header or
    /// any trailing padding.
    fn payload_len(&self) -> usize {
        match self {
            Self::ThirdParty(_) | Self::NextHop(_) => 16,
            Self::PreferFailure => 0,
            Self::Filter { .. } => 20,
            Self::Description(s) => s.len(),
            Self::PortReservation(ports) => ports.len() * 2,
            Self::Unknown { payload, .. } => payload.len(),
        }
    }

    /// Total on-wire size, header + payload + padding, per spec.md §4.2.
    pub fn wire_len(&self) -> usize {
        OPTION_HEADER_LEN + pad4(self.payload_len())
    }

    pub fn encode(&self, w: &mut Writer) {
        let start = w.len();
        w.u8(self.code().as_u8());
        w.reserved(1);
        w.u16(self.payload_len() as u16);
        match self {
            Self::ThirdParty(ip) | Self::NextHop(ip) => {
                w.ipv6(*ip);
            }
            Self::PreferFailure => {}
            Self::Filter { prefix_length, remote_port, remote_ip } => {
                w.reserved(1);
                w.u8(*prefix_length);
                w.u16(*remote_port);
                w.ipv6(*remote_ip);
            }
            Self::Description(text) => {
                w.bytes(text.as_bytes());
            }
            Self::PortReservation(ports) => {
                for port in ports {
                    w.u16(*port);
                }
            }
            Self::Unknown { payload, .. } => {
                w.bytes(payload);
            }
        }
        w.pad_to_4();
        debug_assert_eq!(w.len() - start, self.wire_len());
    }

    /// Decode one option from the front of `r`, advancing past its padding.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let code = OptionCode::from(r.u8()?);
        r.skip(1)?;
        let length = r.u16()? as usize;
        let payload = r.bytes(length)?;
        let mut pr = Reader::new(payload);
        let option = match code {
            OptionCode::ThirdParty => {
                expect_len(code, length, 16)?;
                Self::ThirdParty(pr.ipv6()?)
            }
            OptionCode::NextHop => {
                expect_len(code, length, 16)?;
                Self::NextHop(pr.ipv6()?)
            }
            OptionCode::PreferFailure => {
                expect_len(code, length, 0)?;
                Self::PreferFailure
            }
            OptionCode::Filter => {
                expect_len(code, length, 20)?;
                pr.skip(1)?;
                let prefix_length = pr.u8()?;
                let remote_port = pr.u16()?;
                let remote_ip = pr.ipv6()?;
                Self::Filter { prefix_length, remote_port, remote_ip }
            }
            OptionCode::Description => {
                let text = std::str::from_utf8(payload)
                    .map_err(|_| Error::MalformedPacket("description option is not valid UTF-8".into()))?;
                Self::Description(text.to_string())
            }
            OptionCode::PortReservation => {
                if length % 2 != 0 {
                    return Err(Error::MalformedPacket("port reservation option length must be even".into()));
                }
                let mut ports = Vec::with_capacity(length / 2);
                while !pr.is_empty() {
                    ports.push(pr.u16()?);
                }
                Self::PortReservation(ports)
            }
            OptionCode::Unknown(raw) => Self::Unknown { code: raw, payload: payload.to_vec() },
        };
        // Skip padding up to the next 4-byte boundary.
        let pad = pad4(length) - length;
        r.skip(pad)?;
        Ok(option)
    }

    /// Constructs a [`PcpOption::Filter`], validating the prefix against the
    /// embedded address family (spec.md §4.2/§3, mirroring the teacher's
    /// `FilterOptionPayload` decode check: a mapped IPv4 address needs a
    /// prefix of at least 96 bits).
    pub fn filter(prefix_length: u8, remote_port: u16, remote_ip: Ipv6Addr) -> Result<Self, Error> {
        if crate::codec::is_v4_mapped(&remote_ip) && prefix_length < 96 {
            return Err(invalid_argument(format!(
                "prefix length {prefix_length} is too short for an IPv4-mapped filter address"
            )));
        }
        Ok(Self::Filter { prefix_length, remote_port, remote_ip })
    }
}

fn expect_len(code: OptionCode, got: usize, want: usize) -> Result<(), Error> {
    if got != want {
        return Err(Error::MalformedPacket(format!(
            "option {:?} has length {got}, expected {want}",
            code
        )));
    }
    Ok(())
}

fn pad4(len: usize) -> usize {
    len + (4 - len % 4) % 4
}

/// Encode an ordered list of options, preserving construction order on the
/// wire (spec.md §4.2).
pub fn encode_options(options: &[PcpOption], w: &mut Writer) {
    for opt in options {
        opt.encode(w);
    }
}

/// Decode every option remaining in `r`, validating each against `valid`.
pub fn decode_options(
    r: &mut Reader<'_>,
    valid: impl Fn(&PcpOption) -> bool,
) -> Result<Vec<PcpOption>, Error> {
    let mut options = Vec::new();
    while !r.is_empty() {
        let opt = PcpOption::decode(r)?;
        if !valid(&opt) {
            return Err(Error::MalformedPacket(format!(
                "option code {:?} is not valid for this opcode",
                opt.code()
            )));
        }
        options.push(opt);
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(opt: PcpOption) {
        let mut w = Writer::default();
        opt.encode(&mut w);
        assert_eq!(w.len(), opt.wire_len());
        let mut r = Reader::new(w.as_slice());
        let decoded = PcpOption::decode(&mut r).unwrap();
        assert_eq!(decoded, opt);
        assert!(r.is_empty());
    }

    #[test]
    fn prefer_failure_roundtrips() {
        roundtrip(PcpOption::PreferFailure);
    }

    #[test]
    fn third_party_roundtrips() {
        roundtrip(PcpOption::ThirdParty("::ffff:1.2.3.4".parse().unwrap()));
    }

    #[test]
    fn filter_roundtrips() {
        roundtrip(PcpOption::filter(128, 443, "2001:db8::1".parse().unwrap()).unwrap());
    }

    #[test]
    fn filter_rejects_short_v4_prefix() {
        assert!(PcpOption::filter(64, 443, "::ffff:1.2.3.4".parse().unwrap()).is_err());
    }

    #[test]
    fn description_roundtrips_and_pads() {
        let opt = PcpOption::Description("hi".to_string());
        let mut w = Writer::default();
        opt.encode(&mut w);
        // 2-byte payload rounds up to 4.
        assert_eq!(w.len(), OPTION_HEADER_LEN + 4);
        roundtrip(opt);
    }

    #[test]
    fn port_reservation_roundtrips() {
        roundtrip(PcpOption::PortReservation(vec![1000, 1001, 1002]));
    }

    #[test]
    fn unknown_code_is_preserved() {
        roundtrip(PcpOption::Unknown { code: 200, payload: vec![1, 2, 3, 4] });
    }

    #[test]
    fn order_is_preserved_across_multiple_options() {
        let opts = vec![PcpOption::PreferFailure, PcpOption::Description("x".into())];
        let mut w = Writer::default();
        encode_options(&opts, &mut w);
        let mut r = Reader::new(w.as_slice());
        let decoded = decode_options(&mut r, |_| true).unwrap();
        assert_eq!(decoded, opts);
    }
}
