//! Typed request builders and response shapes for each UPnP-IGD SOAP action
//! named in spec.md §1/§4.4.
//!
//! Child element order is fixed per action (spec.md §4.4): `AddPortMapping`
//! and `AddPinhole`/`DeletePinhole` orders are given explicitly by spec.md;
//! the remaining IGD:2 actions (`AddAnyPortMapping`,
//! `GetSpecificPortMappingEntry`, `UpdatePinhole`,
//! `GetOutboundPinholeTimeout`, `GetFirewallStatus`) follow the UPnP Forum's
//! WANIPConnection:2 / WANIPv6FirewallControl:1 service definitions.

use super::soap::{
    bool_value, build_envelope, build_http_request, ipv4_value, ipv6_no_compression_value, parse_http_response,
    parse_soap_response, Child,
};
use crate::error::Error;
use crate::protocol::PortType;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A target UPnP-IGD control endpoint: host authority, control URL path, and
/// the service type URN advertised for it (spec.md §3's `UpnpIgdRequest`
/// common fields).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlEndpoint {
    pub host: String,
    pub control_path: String,
    pub service_type: String,
}

/// Builds a complete HTTP/1.1 SOAP request for `action` against `endpoint`.
fn request(endpoint: &ControlEndpoint, action: &str, children: Vec<Child>) -> Vec<u8> {
    let body = build_envelope(action, &endpoint.service_type, &children);
    build_http_request(&endpoint.host, &endpoint.control_path, &endpoint.service_type, action, &body)
}

fn field(fields: &[(String, String)], name: &str) -> Result<String, Error> {
    fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
        .ok_or_else(|| Error::MalformedPacket(format!("SOAP response is missing the {name} field")))
}

fn parse_u32(fields: &[(String, String)], name: &str) -> Result<u32, Error> {
    field(fields, name)?
        .parse()
        .map_err(|_| Error::MalformedPacket(format!("{name} is not a valid integer")))
}

fn parse_bool(fields: &[(String, String)], name: &str) -> Result<bool, Error> {
    Ok(field(fields, name)? != "0")
}

/// `AddPortMapping` (spec.md §4.4): children in order `NewRemoteHost,
/// NewExternalPort, NewProtocol, NewInternalPort, NewInternalClient,
/// NewEnabled, NewPortMappingDescription, NewLeaseDuration`.
pub fn add_port_mapping(
    endpoint: &ControlEndpoint,
    remote_host: Option<Ipv4Addr>,
    external_port: u16,
    protocol: PortType,
    internal_port: u16,
    internal_client: Ipv4Addr,
    enabled: bool,
    description: &str,
    lease_duration: u32,
) -> Vec<u8> {
    let children = vec![
        Child::new("NewRemoteHost", ipv4_value(remote_host)),
        Child::new("NewExternalPort", external_port.to_string()),
        Child::new("NewProtocol", protocol.to_string()),
        Child::new("NewInternalPort", internal_port.to_string()),
        Child::new("NewInternalClient", internal_client.to_string()),
        Child::new("NewEnabled", bool_value(enabled)),
        Child::new("NewPortMappingDescription", description.to_string()),
        Child::new("NewLeaseDuration", lease_duration.to_string()),
    ];
    request(endpoint, "AddPortMapping", children)
}

/// `DeletePortMapping` (spec.md §4.4): children `NewRemoteHost,
/// NewExternalPort, NewProtocol`.
pub fn delete_port_mapping(endpoint: &ControlEndpoint, remote_host: Option<Ipv4Addr>, external_port: u16, protocol: PortType) -> Vec<u8> {
    let children = vec![
        Child::new("NewRemoteHost", ipv4_value(remote_host)),
        Child::new("NewExternalPort", external_port.to_string()),
        Child::new("NewProtocol", protocol.to_string()),
    ];
    request(endpoint, "DeletePortMapping", children)
}

/// `GetExternalIPAddress` (spec.md §4.4): no children.
pub fn get_external_ip_address(endpoint: &ControlEndpoint) -> Vec<u8> {
    request(endpoint, "GetExternalIPAddress", Vec::new())
}

pub fn parse_get_external_ip_address_response(status_code: u16, body: &str) -> Result<Ipv4Addr, Error> {
    let fields = parse_soap_response(status_code, "GetExternalIPAddress", body)?;
    field(&fields, "NewExternalIPAddress")?.parse().map_err(|_| Error::MalformedPacket("external IP address is not valid".into()))
}

/// `AddAnyPortMapping`, an IGD:2 extension with the same child order as
/// `AddPortMapping` but that returns the port the gateway actually reserved.
pub fn add_any_port_mapping(
    endpoint: &ControlEndpoint,
    remote_host: Option<Ipv4Addr>,
    external_port: u16,
    protocol: PortType,
    internal_port: u16,
    internal_client: Ipv4Addr,
    enabled: bool,
    description: &str,
    lease_duration: u32,
) -> Vec<u8> {
    let children = vec![
        Child::new("NewRemoteHost", ipv4_value(remote_host)),
        Child::new("NewExternalPort", external_port.to_string()),
        Child::new("NewProtocol", protocol.to_string()),
        Child::new("NewInternalPort", internal_port.to_string()),
        Child::new("NewInternalClient", internal_client.to_string()),
        Child::new("NewEnabled", bool_value(enabled)),
        Child::new("NewPortMappingDescription", description.to_string()),
        Child::new("NewLeaseDuration", lease_duration.to_string()),
    ];
    request(endpoint, "AddAnyPortMapping", children)
}

pub fn parse_add_any_port_mapping_response(status_code: u16, body: &str) -> Result<u16, Error> {
    let fields = parse_soap_response(status_code, "AddAnyPortMapping", body)?;
    parse_u32(&fields, "NewReservedPort").map(|p| p as u16)
}

/// `GetSpecificPortMappingEntry`: children `NewRemoteHost, NewExternalPort,
/// NewProtocol`.
pub fn get_specific_port_mapping_entry(endpoint: &ControlEndpoint, remote_host: Option<Ipv4Addr>, external_port: u16, protocol: PortType) -> Vec<u8> {
    let children = vec![
        Child::new("NewRemoteHost", ipv4_value(remote_host)),
        Child::new("NewExternalPort", external_port.to_string()),
        Child::new("NewProtocol", protocol.to_string()),
    ];
    request(endpoint, "GetSpecificPortMappingEntry", children)
}

/// The fields of a `GetSpecificPortMappingEntry` response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortMappingEntry {
    pub internal_port: u16,
    pub internal_client: Ipv4Addr,
    pub enabled: bool,
    pub description: String,
    pub lease_duration: u32,
}

pub fn parse_get_specific_port_mapping_entry_response(status_code: u16, body: &str) -> Result<PortMappingEntry, Error> {
    let fields = parse_soap_response(status_code, "GetSpecificPortMappingEntry", body)?;
    Ok(PortMappingEntry {
        internal_port: parse_u32(&fields, "NewInternalPort")? as u16,
        internal_client: field(&fields, "NewInternalClient")?.parse().map_err(|_| Error::MalformedPacket("invalid internal client address".into()))?,
        enabled: parse_bool(&fields, "NewEnabled")?,
        description: field(&fields, "NewPortMappingDescription")?,
        lease_duration: parse_u32(&fields, "NewLeaseDuration")?,
    })
}

/// `AddPinhole` (spec.md §4.4): children `RemoteHost, RemotePort,
/// InternalClient, InternalPort, Protocol, LeaseTime`. Addresses use the
/// no-`::`-compression IPv6 encoding and `PortType` encodes as `6`/`17`.
pub fn add_pinhole(
    endpoint: &ControlEndpoint,
    remote_host: Option<Ipv6Addr>,
    remote_port: u16,
    internal_client: Ipv6Addr,
    internal_port: u16,
    protocol: PortType,
    lease_time: u32,
) -> Vec<u8> {
    let children = vec![
        Child::new("RemoteHost", ipv6_no_compression_value(remote_host)),
        Child::new("RemotePort", remote_port.to_string()),
        Child::new("InternalClient", ipv6_no_compression_value(Some(internal_client))),
        Child::new("InternalPort", internal_port.to_string()),
        Child::new("Protocol", protocol.iana_number().to_string()),
        Child::new("LeaseTime", lease_time.to_string()),
    ];
    request(endpoint, "AddPinhole", children)
}

pub fn parse_add_pinhole_response(status_code: u16, body: &str) -> Result<String, Error> {
    let fields = parse_soap_response(status_code, "AddPinhole", body)?;
    field(&fields, "UniqueID")
}

/// `DeletePinhole` (spec.md §4.4): children `UniqueID`.
pub fn delete_pinhole(endpoint: &ControlEndpoint, unique_id: &str) -> Vec<u8> {
    request(endpoint, "DeletePinhole", vec![Child::new("UniqueID", unique_id.to_string())])
}

/// `UpdatePinhole`: children `UniqueID, NewLeaseTime`.
pub fn update_pinhole(endpoint: &ControlEndpoint, unique_id: &str, new_lease_time: u32) -> Vec<u8> {
    let children = vec![Child::new("UniqueID", unique_id.to_string()), Child::new("NewLeaseTime", new_lease_time.to_string())];
    request(endpoint, "UpdatePinhole", children)
}

/// `GetOutboundPinholeTimeout`: children `RemoteHost, RemotePort,
/// InternalClient, InternalPort, Protocol`.
pub fn get_outbound_pinhole_timeout(
    endpoint: &ControlEndpoint,
    remote_host: Option<Ipv6Addr>,
    remote_port: u16,
    internal_client: Ipv6Addr,
    internal_port: u16,
    protocol: PortType,
) -> Vec<u8> {
    let children = vec![
        Child::new("RemoteHost", ipv6_no_compression_value(remote_host)),
        Child::new("RemotePort", remote_port.to_string()),
        Child::new("InternalClient", ipv6_no_compression_value(Some(internal_client))),
        Child::new("InternalPort", internal_port.to_string()),
        Child::new("Protocol", protocol.iana_number().to_string()),
    ];
    request(endpoint, "GetOutboundPinholeTimeout", children)
}

pub fn parse_get_outbound_pinhole_timeout_response(status_code: u16, body: &str) -> Result<u32, Error> {
    let fields = parse_soap_response(status_code, "GetOutboundPinholeTimeout", body)?;
    parse_u32(&fields, "OutboundPinholeTimeout")
}

/// `GetFirewallStatus`: no children.
pub fn get_firewall_status(endpoint: &ControlEndpoint) -> Vec<u8> {
    request(endpoint, "GetFirewallStatus", Vec::new())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirewallStatus {
    pub firewall_enabled: bool,
    pub inbound_pinhole_allowed: bool,
}

pub fn parse_get_firewall_status_response(status_code: u16, body: &str) -> Result<FirewallStatus, Error> {
    let fields = parse_soap_response(status_code, "GetFirewallStatus", body)?;
    Ok(FirewallStatus {
        firewall_enabled: parse_bool(&fields, "FirewallEnabled")?,
        inbound_pinhole_allowed: parse_bool(&fields, "InboundPinholeAllowed")?,
    })
}

/// Parses a raw HTTP response buffer returned by the network gateway into
/// the SOAP fields of `action`'s response, surfacing any `SoapError` fault.
pub fn parse_action_response(buf: &[u8], action: &str) -> Result<Vec<(String, String)>, Error> {
    let http = parse_http_response(buf)?;
    parse_soap_response(http.status_code, action, &http.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> ControlEndpoint {
        ControlEndpoint { host: "192.168.1.1:1780".into(), control_path: "/ctl/IPConn".into(), service_type: "urn:schemas-upnp-org:service:WANIPConnection:1".into() }
    }

    #[test]
    fn add_port_mapping_orders_children_per_spec() {
        let bytes = add_port_mapping(&endpoint(), None, 8080, PortType::Tcp, 8080, "10.0.0.5".parse().unwrap(), true, "demo", 3600);
        let text = String::from_utf8(bytes).unwrap();
        let order = ["NewRemoteHost", "NewExternalPort", "NewProtocol", "NewInternalPort", "NewInternalClient", "NewEnabled", "NewPortMappingDescription", "NewLeaseDuration"];
        let mut last_pos = 0;
        for name in order {
            let pos = text.find(&format!("<{name}>")).unwrap();
            assert!(pos >= last_pos, "{name} out of order");
            last_pos = pos;
        }
        assert!(text.contains("<NewProtocol>TCP</NewProtocol>"));
    }

    #[test]
    fn add_pinhole_wildcards_match_literal_scenario() {
        // spec.md §8, end-to-end scenario 4.
        let bytes = add_pinhole(&endpoint(), None, 0, "::ffff:506:708".parse().unwrap(), 12345, PortType::Tcp, 1000);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("<RemoteHost></RemoteHost>"));
        assert!(text.contains("<RemotePort>0</RemotePort>"));
    }

    #[test]
    fn parse_external_ip_response_round_trips() {
        let body = "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\n\r\n\
            <s:Envelope><s:Body><u:GetExternalIPAddressResponse xmlns:u=\"urn:x\">\
            <NewExternalIPAddress>203.0.113.9</NewExternalIPAddress>\
            </u:GetExternalIPAddressResponse></s:Body></s:Envelope>";
        let ip = parse_action_response(body.as_bytes(), "GetExternalIPAddress").unwrap();
        assert_eq!(ip, vec![("NewExternalIPAddress".to_string(), "203.0.113.9".to_string())]);
    }
}
