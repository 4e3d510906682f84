//! SSDP (Simple Service Discovery Protocol) M-SEARCH request/response
//! framing, used to find UPnP-IGD gateways (spec.md §4.6, §GLOSSARY).
//!
//! A new minimal codec, in the same hand-rolled request/response text-format
//! style as [`crate::upnp::soap`] rather than a dependency.

use crate::error::Error;
use std::fmt::Write as _;

/// The UPnP-IGD service type URNs discovery searches for (spec.md §4.6).
pub const TARGET_SERVICE_TYPES: &[&str] = &[
    "urn:schemas-upnp-org:service:WANIPConnection:1",
    "urn:schemas-upnp-org:service:WANIPConnection:2",
    "urn:schemas-upnp-org:service:WANPPPConnection:1",
    "urn:schemas-upnp-org:service:WANIPv6FirewallControl:1",
];

/// The IPv4 and IPv6 SSDP multicast groups (spec.md §4.6 step 2).
pub const SSDP_MULTICAST_V4: &str = "239.255.255.250:1900";
pub const SSDP_MULTICAST_V6: &str = "[ff02::c]:1900";

/// Builds an SSDP `M-SEARCH` request for `service_type`.
pub fn build_m_search(service_type: &str, mx: u8) -> Vec<u8> {
    let mut req = String::new();
    req.push_str("M-SEARCH * HTTP/1.1\r\n");
    req.push_str("HOST: 239.255.255.250:1900\r\n");
    req.push_str("MAN: \"ssdp:discover\"\r\n");
    let _ = write!(req, "MX: {mx}\r\n");
    let _ = write!(req, "ST: {service_type}\r\n");
    req.push_str("\r\n");
    req.into_bytes()
}

/// A parsed SSDP M-SEARCH response: the advertised service type and the
/// device description URL to fetch next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SsdpResponse {
    pub service_type: String,
    pub location: String,
}

/// Parses an SSDP response datagram. SSDP responses are HTTP/1.1 status
/// lines followed by colon-separated headers, one per line, with no body.
pub fn parse_m_search_response(buf: &[u8]) -> Result<SsdpResponse, Error> {
    let text = std::str::from_utf8(buf).map_err(|_| Error::MalformedPacket("SSDP response is not valid UTF-8".into()))?;
    let mut lines = text.split("\r\n");
    let status_line = lines.next().ok_or_else(|| Error::MalformedPacket("empty SSDP response".into()))?;
    if !status_line.starts_with("HTTP/1.1 200") {
        return Err(Error::MalformedPacket(format!("unexpected SSDP status line: {status_line}")));
    }
    let mut service_type = None;
    let mut location = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else { continue };
        match name.trim().to_ascii_uppercase().as_str() {
            "ST" => service_type = Some(value.trim().to_string()),
            "LOCATION" => location = Some(value.trim().to_string()),
            _ => {}
        }
    }
    Ok(SsdpResponse {
        service_type: service_type.ok_or_else(|| Error::MalformedPacket("SSDP response has no ST header".into()))?,
        location: location.ok_or_else(|| Error::MalformedPacket("SSDP response has no LOCATION header".into()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn m_search_contains_required_headers() {
        let req = String::from_utf8(build_m_search(TARGET_SERVICE_TYPES[0], 2)).unwrap();
        assert!(req.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(req.contains("MAN: \"ssdp:discover\"\r\n"));
        assert!(req.contains("MX: 2\r\n"));
        assert!(req.contains(&format!("ST: {}\r\n", TARGET_SERVICE_TYPES[0])));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[test]
    fn parses_a_typical_response() {
        let raw = "HTTP/1.1 200 OK\r\nCACHE-CONTROL: max-age=1800\r\n\
            LOCATION: http://192.168.1.1:1780/rootDesc.xml\r\n\
            ST: urn:schemas-upnp-org:service:WANIPConnection:1\r\n\r\n";
        let resp = parse_m_search_response(raw.as_bytes()).unwrap();
        assert_eq!(resp.location, "http://192.168.1.1:1780/rootDesc.xml");
        assert_eq!(resp.service_type, "urn:schemas-upnp-org:service:WANIPConnection:1");
    }

    #[test]
    fn rejects_non_200_status() {
        let raw = "HTTP/1.1 404 Not Found\r\n\r\n";
        assert!(parse_m_search_response(raw.as_bytes()).is_err());
    }
}
