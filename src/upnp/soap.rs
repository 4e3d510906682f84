//! SOAP-over-HTTP envelope construction and response parsing (spec.md §4.4).
//!
//! Hand-rolled rather than built on a generic XML crate: neither the teacher
//! nor any repo in the wider retrieval pack depends on one for this shape of
//! work, and spec.md demands byte-exact `Content-Length` values that a
//! general-purpose XML writer would not guarantee without extra care.

use super::error::SoapError;
use crate::error::Error;
use std::fmt::Write as _;
use std::net::{Ipv4Addr, Ipv6Addr};

const XML_NS_ENVELOPE: &str = "http://www.w3.org/2003/05/soap-envelope/";
const XML_NS_ENCODING: &str = "http://www.w3.org/2003/05/soap-encoding";

/// A single child element of a SOAP action call, already rendered to its
/// wire-form text value.
pub struct Child {
    pub name: &'static str,
    pub value: String,
}

impl Child {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self { name, value: xml_escape(&value.into()) }
    }
}

/// The boolean encoding rule of spec.md §4.4's child value table: `1`/`0`.
pub fn bool_value(v: bool) -> String {
    if v { "1".to_string() } else { "0".to_string() }
}

/// The IPv4 encoding rule: dotted quad, or empty string for the wildcard.
pub fn ipv4_value(v: Option<Ipv4Addr>) -> String {
    match v {
        Some(addr) if !addr.is_unspecified() => addr.to_string(),
        _ => String::new(),
    }
}

/// The IPv6 encoding rule used by `AddPinhole`'s address fields: canonical
/// lowercase hextets with no `::` compression, or empty for the wildcard
/// (spec.md §4.4 child value table).
pub fn ipv6_no_compression_value(v: Option<Ipv6Addr>) -> String {
    match v {
        Some(addr) if addr != Ipv6Addr::UNSPECIFIED => {
            let segments = addr.segments();
            let mut out = String::with_capacity(39);
            for (i, seg) in segments.iter().enumerate() {
                if i > 0 {
                    out.push(':');
                }
                let _ = write!(out, "{seg:04x}");
            }
            out
        }
        _ => String::new(),
    }
}

/// Escapes the five XML predefined entities in free text.
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Builds the SOAP 1.2 envelope body for one action call, in the exact
/// line-for-line form spec.md §4.4 specifies.
pub fn build_envelope(action: &str, service_type: &str, children: &[Child]) -> String {
    let mut body = String::new();
    body.push_str("<?xml version=\"1.0\"?>\r\n");
    let _ = write!(
        body,
        "<soap:Envelope xmlns:soap=\"{XML_NS_ENVELOPE}\" soap:encodingStyle=\"{XML_NS_ENCODING}\">\r\n"
    );
    body.push_str("<soap:Body>\r\n");
    let _ = write!(body, "<u:{action} xmlns:u=\"{service_type}\">\r\n");
    for child in children {
        let _ = write!(body, "<{}>{}</{}>\r\n", child.name, child.value, child.name);
    }
    let _ = write!(body, "</u:{action}>\r\n");
    body.push_str("</soap:Body>\r\n");
    body.push_str("</soap:Envelope>\r\n");
    body
}

/// Wraps a SOAP body in the HTTP/1.1 `POST` request spec.md §4.4 specifies,
/// with a byte-exact `Content-Length`.
pub fn build_http_request(host: &str, control_path: &str, service_type: &str, action: &str, body: &str) -> Vec<u8> {
    let content_length = body.len();
    let mut request = String::new();
    let _ = write!(request, "POST {control_path} HTTP/1.1\r\n");
    let _ = write!(request, "Host: {host}\r\n");
    request.push_str("Content-Type: text/xml\r\n");
    let _ = write!(request, "SOAPAction: {service_type}#{action}\r\n");
    request.push_str("Connection: Close\r\n");
    request.push_str("Cache-Control: no-cache\r\n");
    request.push_str("Pragma: no-cache\r\n");
    let _ = write!(request, "Content-Length: {content_length}\r\n");
    request.push_str("\r\n");
    request.push_str(body);
    request.into_bytes()
}

/// A parsed HTTP response: status code, header map and raw body text.
pub struct HttpResponse {
    pub status_code: u16,
    pub body: String,
}

/// Splits an HTTP response buffer into its status line and body, per the
/// standard `\r\n\r\n` header/body boundary.
pub fn parse_http_response(buf: &[u8]) -> Result<HttpResponse, Error> {
    let text = std::str::from_utf8(buf)
        .map_err(|_| Error::MalformedPacket("HTTP response is not valid UTF-8".into()))?;
    let (head, body) = text
        .split_once("\r\n\r\n")
        .ok_or_else(|| Error::MalformedPacket("HTTP response has no header/body separator".into()))?;
    let status_line = head
        .lines()
        .next()
        .ok_or_else(|| Error::MalformedPacket("HTTP response has no status line".into()))?;
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts.next();
    let status_code: u16 = parts
        .next()
        .ok_or_else(|| Error::MalformedPacket("HTTP status line has no status code".into()))?
        .parse()
        .map_err(|_| Error::MalformedPacket("HTTP status code is not numeric".into()))?;
    Ok(HttpResponse { status_code, body: body.to_string() })
}

/// Finds the first top-level occurrence of an element named `local_name`
/// (matching any namespace prefix), returning its exact tag name as written
/// and its inner text.
fn find_element<'a>(xml: &'a str, local_name: &str) -> Option<(&'a str, &'a str)> {
    let mut search_from = 0;
    while let Some(lt) = xml[search_from..].find('<') {
        let start = search_from + lt;
        let rest = &xml[start + 1..];
        if rest.starts_with('/') || rest.starts_with('?') {
            search_from = start + 1;
            continue;
        }
        let name_end = rest.find(|c: char| c.is_whitespace() || c == '>' || c == '/').unwrap_or(rest.len());
        let tag_name = &rest[..name_end];
        let matches = tag_name == local_name || tag_name.ends_with(&format!(":{local_name}"));
        if !matches {
            search_from = start + 1;
            continue;
        }
        let tag_end = xml[start..].find('>')? + start;
        let self_closing = xml.as_bytes().get(tag_end - 1) == Some(&b'/');
        if self_closing {
            return Some((tag_name, ""));
        }
        let content_start = tag_end + 1;
        let closing = format!("</{tag_name}>");
        let content_end = xml[content_start..].find(&closing)? + content_start;
        return Some((tag_name, &xml[content_start..content_end]));
    }
    None
}

/// Finds every top-level occurrence of an element named `local_name`
/// (matching any namespace prefix) anywhere in `xml`, returning each one's
/// inner text. Used to scan device-description documents for repeated
/// `<service>` blocks.
pub(crate) fn find_all_elements<'a>(xml: &'a str, local_name: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut search_from = 0;
    while let Some((_, content)) = find_element(&xml[search_from..], local_name) {
        let content_start = search_from + (content.as_ptr() as usize - xml[search_from..].as_ptr() as usize);
        out.push(&xml[content_start..content_start + content.len()]);
        search_from = content_start + content.len();
    }
    out
}

/// Extracts the flat list of direct child elements inside `xml` (no nested
/// containers), unescaping their text content.
pub fn parse_flat_children(xml: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(lt) = xml[pos..].find('<') {
        let start = pos + lt;
        let rest = &xml[start + 1..];
        if rest.starts_with('/') {
            break;
        }
        let Some(name_end) = rest.find(|c: char| c.is_whitespace() || c == '>' || c == '/') else { break };
        let tag_name = rest[..name_end].to_string();
        let Some(tag_end_rel) = xml[start..].find('>') else { break };
        let tag_end = start + tag_end_rel;
        let self_closing = xml.as_bytes().get(tag_end - 1) == Some(&b'/');
        if self_closing {
            out.push((tag_name, String::new()));
            pos = tag_end + 1;
            continue;
        }
        let content_start = tag_end + 1;
        let closing = format!("</{tag_name}>");
        let Some(content_end_rel) = xml[content_start..].find(&closing) else { break };
        let content_end = content_start + content_end_rel;
        out.push((tag_name, xml_unescape(&xml[content_start..content_end])));
        pos = content_end + closing.len();
    }
    out
}

/// Parses a SOAP response body for `action`: on success, the flat field list
/// inside `<ACTIONResponse>`; on fault, a decoded [`SoapError`].
///
/// Per spec.md §4.4: unknown elements inside a recognized response are
/// ignored; a response with neither an `ACTIONResponse` nor a `Fault`
/// element is `InvalidResponse` (surfaced here as `MalformedPacket`).
pub fn parse_soap_response(status_code: u16, action: &str, body: &str) -> Result<Vec<(String, String)>, Error> {
    if status_code == 200 {
        let response_tag = format!("{action}Response");
        let (_, inner) =
            find_element(body, &response_tag).ok_or_else(|| Error::MalformedPacket("response has no ACTIONResponse element".into()))?;
        return Ok(parse_flat_children(inner));
    }

    let (_, fault_inner) =
        find_element(body, "Fault").ok_or_else(|| Error::MalformedPacket("non-200 response has no Fault element".into()))?;
    let fault_code = find_element(fault_inner, "faultcode").map(|(_, v)| v.to_string()).unwrap_or_default();
    let fault_description = find_element(fault_inner, "faultstring").map(|(_, v)| v.to_string()).unwrap_or_default();
    let upnp_error_code = find_element(fault_inner, "errorCode").and_then(|(_, v)| v.trim().parse::<u32>().ok());
    Err(Error::from(SoapError { status_code, fault_code, fault_description, upnp_error_code }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_encoding() {
        assert_eq!(bool_value(true), "1");
        assert_eq!(bool_value(false), "0");
    }

    #[test]
    fn ipv4_wildcard_is_empty() {
        assert_eq!(ipv4_value(None), "");
        assert_eq!(ipv4_value(Some(Ipv4Addr::UNSPECIFIED)), "");
        assert_eq!(ipv4_value(Some(Ipv4Addr::new(1, 2, 3, 4))), "1.2.3.4");
    }

    #[test]
    fn ipv6_no_compression() {
        let addr: Ipv6Addr = "0102:0304:0506:0708:090a:0b0c:0d0e:0f10".parse().unwrap();
        assert_eq!(ipv6_no_compression_value(Some(addr)), "0102:0304:0506:0708:090a:0b0c:0d0e:0f10");
        assert_eq!(ipv6_no_compression_value(None), "");
    }

    #[test]
    fn delete_pinhole_envelope_matches_literal_scenario() {
        // spec.md §8, end-to-end scenario 1.
        let children = vec![Child::new("UniqueID", "12345")];
        let body = build_envelope("DeletePinhole", "service:type", &children);
        let request = build_http_request("fake", "/controllink", "service:type", "DeletePinhole", &body);
        let text = String::from_utf8(request).unwrap();
        assert!(text.starts_with("POST /controllink HTTP/1.1\r\nHost: fake\r\n"));
        assert!(text.contains("SOAPAction: service:type#DeletePinhole\r\n"));
        assert!(text.contains("Content-Length: 290\r\n"));
        assert!(text.ends_with("<UniqueID>12345</UniqueID>\r\n</u:DeletePinhole>\r\n</soap:Body>\r\n</soap:Envelope>\r\n"));
    }

    #[test]
    fn add_pinhole_tcp_ipv4_matches_literal_scenario() {
        // spec.md §8, end-to-end scenario 2.
        let children = vec![
            Child::new("RemoteHost", "::ffff:102:304"),
            Child::new("RemotePort", "15"),
            Child::new("InternalClient", "::ffff:506:708"),
            Child::new("InternalPort", "12345"),
            Child::new("Protocol", "6"),
            Child::new("LeaseTime", "1000"),
        ];
        let body = build_envelope("AddPinhole", "service:type", &children);
        assert!(body.contains("<RemoteHost>::ffff:102:304</RemoteHost>"));
        assert!(body.contains("<InternalClient>::ffff:506:708</InternalClient>"));
        assert!(body.contains("<Protocol>6</Protocol>"));
        assert!(body.contains("<LeaseTime>1000</LeaseTime>"));
        assert_eq!(body.len(), 464);
    }

    #[test]
    fn content_length_always_matches_body_byte_length() {
        let children = vec![Child::new("Foo", "bar"), Child::new("Baz", "<quux & stuff>")];
        let body = build_envelope("SomeAction", "urn:some:service:1", &children);
        let request = build_http_request("host", "/ctrl", "urn:some:service:1", "SomeAction", &body);
        let text = String::from_utf8(request).unwrap();
        let declared: usize = text
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let actual_body = text.split_once("\r\n\r\n").unwrap().1;
        assert_eq!(declared, actual_body.len());
    }

    #[test]
    fn parses_action_response_fields() {
        let body = "<s:Envelope><s:Body><u:GetExternalIPAddressResponse xmlns:u=\"urn:x\">\
            <NewExternalIPAddress>203.0.113.1</NewExternalIPAddress>\
            </u:GetExternalIPAddressResponse></s:Body></s:Envelope>";
        let fields = parse_soap_response(200, "GetExternalIPAddress", body).unwrap();
        assert_eq!(fields, vec![("NewExternalIPAddress".to_string(), "203.0.113.1".to_string())]);
    }

    #[test]
    fn parses_fault_with_upnp_error_code() {
        let body = "<s:Envelope><s:Body><s:Fault><faultcode>s:Client</faultcode>\
            <faultstring>UPnPError</faultstring><detail><UPnPError><errorCode>718</errorCode>\
            <errorDescription>ConflictInMappingEntry</errorDescription></UPnPError></detail>\
            </s:Fault></s:Body></s:Envelope>";
        let err = parse_soap_response(500, "AddPortMapping", body).unwrap_err();
        match err {
            Error::Protocol(crate::error::ProtocolError::Soap(soap)) => {
                assert_eq!(soap.status_code, 500);
                assert_eq!(soap.upnp_error_code, Some(718));
                assert_eq!(soap.fault_description, "UPnPError");
            }
            other => panic!("expected a SOAP protocol error, got {other:?}"),
        }
    }
}
