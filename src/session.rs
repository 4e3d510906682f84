//! Mapping sessions: `create`/`refresh`/`release` against whichever
//! [`Mapper`] discovery produced (spec.md §4.7).

use crate::cancel::CancellationToken;
use crate::config::refresh_margin;
use crate::error::{Error, ProtocolError};
use crate::gateway::{NetworkGateway, UdpSubscription};
use crate::mapper::Mapper;
use crate::natpmp::{NatPmpRequest, NatPmpResponse};
use crate::pcp::{Epoch, MappingNonce, OpCode, PcpRequest, PcpResponse};
use crate::protocol::PortType;
use crate::retry::{RetryController, RetryProtocol};
use crate::upnp::{self, ControlEndpoint};
use rand::Rng;
use std::net::{IpAddr, Ipv6Addr};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// An installed port mapping (spec.md §4.7): `externalPort`, `externalIp`,
/// `expiresAt`, plus whatever this crate needs internally to refresh or
/// release it again without asking the caller to remember protocol details.
#[derive(Clone, Debug)]
pub struct Mapping {
    pub mapper: Mapper,
    pub protocol: PortType,
    pub internal_port: u16,
    pub external_port: u16,
    pub external_ip: IpAddr,
    pub expires_at: Instant,
    lifetime: Duration,
    /// The PCP mapping nonce, reused across `refresh` calls so the server
    /// recognizes a refresh as extending the same mapping (RFC 6887 §11).
    nonce: Option<MappingNonce>,
    /// The PCP epoch last seen from this server, and the client-side instant
    /// it was observed at, used to detect a server restart on the next
    /// `refresh` (RFC 6887 §8.5).
    epoch: Option<(Epoch, Instant)>,
    /// A UPnP-IGD pinhole's `UniqueID`, needed to refresh or delete it.
    pinhole_id: Option<String>,
}

impl Mapping {
    /// When this mapping should be refreshed at the latest (spec.md §4.7:
    /// `expiresAt - max(60s, lifetime/2)`).
    pub fn refresh_by(&self) -> Instant {
        self.expires_at - refresh_margin(self.lifetime)
    }
}

/// Everything a mapping operation needs to talk to the network: the gateway,
/// a retry controller for UDP protocols, and the UDP datagram channel and
/// subscription to read responses from.
pub struct SessionContext<'a> {
    pub network: &'a dyn NetworkGateway,
    pub retry: &'a RetryController,
    pub client_ip: Ipv6Addr,
    pub udp_subscription: UdpSubscription,
    pub udp_responses: &'a mut mpsc::Receiver<Vec<u8>>,
}

/// Creates a mapping (spec.md §4.7 `create`).
pub async fn create(
    ctx: &mut SessionContext<'_>,
    mapper: &Mapper,
    internal_port: u16,
    preferred_external_port: u16,
    protocol: PortType,
    lifetime: Duration,
    cancel: &mut CancellationToken,
) -> Result<Mapping, Error> {
    match mapper {
        Mapper::Pcp { addr } => create_pcp(ctx, *addr, internal_port, preferred_external_port, protocol, lifetime, cancel).await,
        Mapper::NatPmp { addr } => create_natpmp(ctx, *addr, internal_port, preferred_external_port, protocol, lifetime, cancel).await,
        Mapper::IgdV4 { endpoint } => create_igd_v4(ctx, endpoint, internal_port, preferred_external_port, protocol, lifetime).await,
        Mapper::IgdV6Pinhole { endpoint } => {
            create_igd_pinhole(ctx, endpoint, internal_port, preferred_external_port, protocol, lifetime).await
        }
    }
}

/// Refreshes a mapping before it expires (spec.md §4.7 `refresh`): re-issues
/// the same request, reusing the PCP nonce or UPnP `UniqueID` where the
/// protocol requires it to recognize this as an extension rather than a new
/// mapping.
pub async fn refresh(ctx: &mut SessionContext<'_>, mapping: &Mapping, cancel: &mut CancellationToken) -> Result<Mapping, Error> {
    match &mapping.mapper {
        Mapper::Pcp { addr } => {
            let nonce = mapping.nonce.unwrap_or_else(MappingNonce::random);
            create_pcp_with_nonce(
                ctx,
                nonce,
                *addr,
                mapping.internal_port,
                mapping.external_port,
                mapping.protocol,
                mapping.lifetime,
                mapping.epoch,
                cancel,
            )
            .await
        }
        Mapper::NatPmp { addr } => {
            create_natpmp(ctx, *addr, mapping.internal_port, mapping.external_port, mapping.protocol, mapping.lifetime, cancel).await
        }
        Mapper::IgdV4 { endpoint } => {
            create_igd_v4(ctx, endpoint, mapping.internal_port, mapping.external_port, mapping.protocol, mapping.lifetime).await
        }
        Mapper::IgdV6Pinhole { endpoint } => {
            if let Some(id) = &mapping.pinhole_id {
                update_igd_pinhole(ctx, endpoint, id, mapping.lifetime).await?;
                Ok(Mapping { expires_at: Instant::now() + mapping.lifetime, ..mapping.clone() })
            } else {
                create_igd_pinhole(ctx, endpoint, mapping.internal_port, mapping.external_port, mapping.protocol, mapping.lifetime).await
            }
        }
    }
}

/// Removes a mapping from the gateway (spec.md §4.7 `release`).
pub async fn release(ctx: &mut SessionContext<'_>, mapping: &Mapping, cancel: &mut CancellationToken) -> Result<(), Error> {
    match &mapping.mapper {
        Mapper::Pcp { addr } => {
            let nonce = mapping.nonce.unwrap_or_else(MappingNonce::random);
            // A MAP request with lifetime 0 deletes the mapping (RFC 6887 §11).
            let request = PcpRequest::map(
                ctx.client_ip,
                0,
                nonce,
                mapping.protocol,
                mapping.internal_port,
                mapping.external_port,
                crate::codec::v6_wildcard(),
                Vec::new(),
            )?;
            let bytes = send_pcp(ctx, *addr, &request, cancel).await?;
            let response = PcpResponse::parse(&bytes, OpCode::Map)?;
            result_from_pcp(&response)
        }
        Mapper::NatPmp { addr } => {
            // A Map request with lifetime 0 deletes it (RFC 6886 §3.3).
            let request = NatPmpRequest::map(mapping.protocol, mapping.internal_port, 0, 0)?;
            let bytes = send_natpmp(ctx, *addr, &request, cancel).await?;
            let opcode = if mapping.protocol == PortType::Udp { 1 } else { 2 };
            let response = NatPmpResponse::parse(&bytes, opcode)?;
            result_from_natpmp(&response)
        }
        Mapper::IgdV4 { endpoint } => {
            let remote_host = match mapping.external_ip {
                IpAddr::V4(addr) if !addr.is_unspecified() => Some(addr),
                _ => None,
            };
            let request = upnp::delete_port_mapping(endpoint, remote_host, mapping.external_port, mapping.protocol);
            let response = send_soap(ctx, request).await?;
            upnp::parse_action_response(&response, "DeletePortMapping")?;
            Ok(())
        }
        Mapper::IgdV6Pinhole { endpoint } => {
            let Some(id) = &mapping.pinhole_id else { return Ok(()) };
            let request = upnp::delete_pinhole(endpoint, id);
            let response = send_soap(ctx, request).await?;
            upnp::parse_action_response(&response, "DeletePinhole")?;
            Ok(())
        }
    }
}

async fn create_pcp(
    ctx: &mut SessionContext<'_>,
    addr: std::net::SocketAddr,
    internal_port: u16,
    preferred_external_port: u16,
    protocol: PortType,
    lifetime: Duration,
    cancel: &mut CancellationToken,
) -> Result<Mapping, Error> {
    create_pcp_with_nonce(ctx, MappingNonce::random(), addr, internal_port, preferred_external_port, protocol, lifetime, None, cancel)
        .await
}

/// Parameter order kept distinct from `create_pcp` so call sites can't
/// accidentally swap a freshly-generated nonce for the address.
///
/// `previous_epoch` is the epoch last observed from this same server (if
/// any), used to detect a server restart per RFC 6887 §8.5; `create_pcp`
/// passes `None` since there is nothing yet to compare against, while
/// `refresh` passes the epoch recorded on the mapping being refreshed.
#[allow(clippy::too_many_arguments)]
async fn create_pcp_with_nonce(
    ctx: &mut SessionContext<'_>,
    nonce: MappingNonce,
    addr: std::net::SocketAddr,
    internal_port: u16,
    preferred_external_port: u16,
    protocol: PortType,
    lifetime: Duration,
    previous_epoch: Option<(Epoch, Instant)>,
    cancel: &mut CancellationToken,
) -> Result<Mapping, Error> {
    let request = PcpRequest::map(
        ctx.client_ip,
        lifetime.as_secs() as u32,
        nonce,
        protocol,
        internal_port,
        preferred_external_port,
        crate::codec::v6_wildcard(),
        Vec::new(),
    )?;
    let bytes = send_pcp(ctx, addr, &request, cancel).await?;
    let response = PcpResponse::parse(&bytes, OpCode::Map)?;
    result_from_pcp(&response)?;
    let PcpResponse::Map { header, body, .. } = &response else { unreachable!("opcode checked by parse") };
    let now = Instant::now();
    let new_epoch = Epoch(header.epoch_time);
    if let Some((prev_epoch, observed_at)) = previous_epoch {
        let elapsed = now.saturating_duration_since(observed_at).as_secs() as u32;
        if !new_epoch.validate(prev_epoch, elapsed) {
            tracing::warn!(addr = %addr, "PCP epoch discontinuity: server likely restarted and lost mapping state");
        }
    }
    Ok(Mapping {
        mapper: Mapper::Pcp { addr },
        protocol,
        internal_port,
        external_port: body.external_port,
        external_ip: crate::codec::from_wire_ipv6(body.external_ip),
        expires_at: Instant::now() + Duration::from_secs(header.lifetime as u64),
        lifetime: Duration::from_secs(header.lifetime as u64),
        nonce: Some(nonce),
        epoch: Some((new_epoch, now)),
        pinhole_id: None,
    })
}

async fn create_natpmp(
    ctx: &mut SessionContext<'_>,
    addr: std::net::SocketAddr,
    internal_port: u16,
    preferred_external_port: u16,
    protocol: PortType,
    lifetime: Duration,
    cancel: &mut CancellationToken,
) -> Result<Mapping, Error> {
    let request = NatPmpRequest::map(protocol, internal_port, preferred_external_port, lifetime.as_secs() as u32)?;
    let bytes = send_natpmp(ctx, addr, &request, cancel).await?;
    let opcode = if protocol == PortType::Udp { 1 } else { 2 };
    let response = NatPmpResponse::parse(&bytes, opcode)?;
    result_from_natpmp(&response)?;
    let NatPmpResponse::Map { external_port, lifetime: granted_lifetime, .. } = response else {
        unreachable!("opcode checked by parse")
    };
    // RFC 6886 carries no external IP in the Map response; a fresh
    // ExternalAddress query is needed to learn it.
    let ext_request = NatPmpRequest::ExternalAddress;
    let ext_bytes = send_natpmp(ctx, addr, &ext_request, cancel).await?;
    let ext_response = NatPmpResponse::parse(&ext_bytes, 0)?;
    result_from_natpmp(&ext_response)?;
    let NatPmpResponse::ExternalAddress { external_ip, .. } = ext_response else { unreachable!("opcode checked by parse") };
    Ok(Mapping {
        mapper: Mapper::NatPmp { addr },
        protocol,
        internal_port,
        external_port,
        external_ip: IpAddr::V4(external_ip),
        expires_at: Instant::now() + Duration::from_secs(granted_lifetime as u64),
        lifetime: Duration::from_secs(granted_lifetime as u64),
        nonce: None,
        epoch: None,
        pinhole_id: None,
    })
}

async fn create_igd_v4(
    ctx: &mut SessionContext<'_>,
    endpoint: &ControlEndpoint,
    internal_port: u16,
    preferred_external_port: u16,
    protocol: PortType,
    lifetime: Duration,
) -> Result<Mapping, Error> {
    let internal_client = local_ipv4(ctx.client_ip);
    let request = upnp::add_port_mapping(
        endpoint,
        None,
        preferred_external_port,
        protocol,
        internal_port,
        internal_client,
        true,
        "gwmap",
        lifetime.as_secs() as u32,
    );
    let response = send_soap(ctx, request).await?;
    upnp::parse_action_response(&response, "AddPortMapping")?;
    Ok(Mapping {
        mapper: Mapper::IgdV4 { endpoint: endpoint.clone() },
        protocol,
        internal_port,
        external_port: preferred_external_port,
        external_ip: IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
        expires_at: Instant::now() + lifetime,
        lifetime,
        nonce: None,
        epoch: None,
        pinhole_id: None,
    })
}

async fn create_igd_pinhole(
    ctx: &mut SessionContext<'_>,
    endpoint: &ControlEndpoint,
    internal_port: u16,
    preferred_external_port: u16,
    protocol: PortType,
    lifetime: Duration,
) -> Result<Mapping, Error> {
    let internal_client = local_ipv6(ctx.client_ip);
    let request = upnp::add_pinhole(
        endpoint,
        None,
        preferred_external_port,
        internal_client,
        internal_port,
        protocol,
        lifetime.as_secs() as u32,
    );
    let response = send_soap(ctx, request).await?;
    let fields = upnp::parse_action_response(&response, "AddPinhole")?;
    let unique_id = fields.into_iter().find(|(k, _)| k == "UniqueID").map(|(_, v)| v);
    Ok(Mapping {
        mapper: Mapper::IgdV6Pinhole { endpoint: endpoint.clone() },
        protocol,
        internal_port,
        external_port: preferred_external_port,
        external_ip: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        expires_at: Instant::now() + lifetime,
        lifetime,
        nonce: None,
        epoch: None,
        pinhole_id: unique_id,
    })
}

async fn update_igd_pinhole(ctx: &mut SessionContext<'_>, endpoint: &ControlEndpoint, id: &str, lifetime: Duration) -> Result<(), Error> {
    let request = upnp::update_pinhole(endpoint, id, lifetime.as_secs() as u32);
    let response = send_soap(ctx, request).await?;
    upnp::parse_action_response(&response, "UpdatePinhole")?;
    Ok(())
}

fn local_ipv4(client_ip: Ipv6Addr) -> std::net::Ipv4Addr {
    match crate::codec::from_wire_ipv6(client_ip) {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => std::net::Ipv4Addr::UNSPECIFIED,
    }
}

fn local_ipv6(client_ip: Ipv6Addr) -> Ipv6Addr {
    client_ip
}

fn result_from_pcp(response: &PcpResponse) -> Result<(), Error> {
    let code = response.result_code();
    if code.is_success() {
        Ok(())
    } else {
        Err(ProtocolError::ResultCode(code).into())
    }
}

fn result_from_natpmp(response: &NatPmpResponse) -> Result<(), Error> {
    use crate::natpmp::NatPmpResultCode;
    use crate::pcp::ResultCode;
    let code = response.result_code();
    if code.is_success() {
        return Ok(());
    }
    // RFC 6887 §7.4 defines PCP's result codes as a superset of RFC 6886's;
    // reuse the shared taxonomy instead of a second, narrower error type.
    let pcp_code = match code {
        NatPmpResultCode::Success => ResultCode::Success,
        NatPmpResultCode::UnsuppVersion => ResultCode::UnsuppVersion,
        NatPmpResultCode::NotAuthorized => ResultCode::NotAuthorized,
        NatPmpResultCode::NetworkFailure => ResultCode::NetworkFailure,
        NatPmpResultCode::OutOfResources => ResultCode::NoResources,
        NatPmpResultCode::UnsuppOpcode => ResultCode::UnsuppOpcode,
    };
    Err(ProtocolError::ResultCode(pcp_code).into())
}

async fn send_pcp(
    ctx: &mut SessionContext<'_>,
    addr: std::net::SocketAddr,
    request: &PcpRequest,
    cancel: &mut CancellationToken,
) -> Result<Vec<u8>, Error> {
    let nonce_to_match = match request {
        PcpRequest::Map { body, .. } => Some(*body.nonce.as_bytes()),
        PcpRequest::Peer { body, .. } => Some(*body.map.nonce.as_bytes()),
        PcpRequest::Announce { .. } => None,
    };
    let expected_opcode = request.opcode();
    // Retransmit across the request's own lifetime (RFC 6887 §8.1.1: continue
    // until MRC or the request lifetime elapses). A lifetime-0 request (a
    // delete, RFC 6887 §11) has no such window to wait out, so fall back to
    // NAT-PMP's fixed give-up budget instead of an immediate timeout.
    let lifetime = request.header().lifetime;
    let retry_budget =
        if lifetime == 0 { Duration::from_secs(128) } else { Duration::from_secs(lifetime as u64) };
    let deadline = Instant::now() + retry_budget;
    let bytes = request.dump();
    let network = ctx.network;
    ctx.retry
        .drive(
            RetryProtocol::Pcp,
            &bytes,
            |payload| network.send_udp(None, addr, payload),
            ctx.udp_responses,
            deadline,
            cancel,
            |buf| matches_pcp_response(buf, expected_opcode, nonce_to_match),
        )
        .await
}

async fn send_natpmp(
    ctx: &mut SessionContext<'_>,
    addr: std::net::SocketAddr,
    request: &NatPmpRequest,
    cancel: &mut CancellationToken,
) -> Result<Vec<u8>, Error> {
    let expected_opcode = match request {
        NatPmpRequest::ExternalAddress => 0,
        NatPmpRequest::Map { protocol: PortType::Udp, .. } => 1,
        NatPmpRequest::Map { protocol: PortType::Tcp, .. } => 2,
    };
    let deadline = Instant::now() + Duration::from_secs(128);
    let bytes = request.dump();
    let network = ctx.network;
    ctx.retry
        .drive(
            RetryProtocol::NatPmp,
            &bytes,
            |payload| network.send_udp(None, addr, payload),
            ctx.udp_responses,
            deadline,
            cancel,
            |buf| matches_natpmp_response(buf, expected_opcode),
        )
        .await
}

fn matches_pcp_response(buf: &[u8], expected_opcode: OpCode, nonce: Option<[u8; 12]>) -> bool {
    let Ok(response) = PcpResponse::parse(buf, expected_opcode) else { return false };
    match (nonce, &response) {
        (Some(expected), PcpResponse::Map { body, .. }) => body.nonce.as_bytes() == &expected,
        (Some(expected), PcpResponse::Peer { body, .. }) => body.map.nonce.as_bytes() == &expected,
        _ => true,
    }
}

fn matches_natpmp_response(buf: &[u8], expected_opcode: u8) -> bool {
    NatPmpResponse::parse(buf, expected_opcode).is_ok()
}

/// Sends a SOAP HTTP request and returns the raw response bytes, for
/// `upnp::parse_action_response` to parse.
async fn send_soap(ctx: &mut SessionContext<'_>, request_bytes: Vec<u8>) -> Result<Vec<u8>, Error> {
    let endpoint_addr = soap_destination(&request_bytes)?;
    let handle = ctx.network.open_tcp(endpoint_addr).await?;
    ctx.network.write_tcp(handle, &request_bytes).await?;
    let response_bytes = ctx.network.read_tcp(handle).await?;
    ctx.network.close_tcp(handle).await?;
    Ok(response_bytes)
}

/// Pulls the `Host:` header back out of an already-built SOAP HTTP request to
/// resolve where to connect; avoids threading the endpoint through every
/// `upnp::actions` builder call site a second time.
fn soap_destination(request_bytes: &[u8]) -> Result<std::net::SocketAddr, Error> {
    let text = std::str::from_utf8(request_bytes).map_err(|_| Error::MalformedPacket("SOAP request is not valid UTF-8".into()))?;
    let host = text
        .lines()
        .find_map(|line| line.strip_prefix("Host: "))
        .ok_or_else(|| Error::MalformedPacket("SOAP request has no Host header".into()))?;
    host.trim()
        .parse()
        .map_err(|_| Error::MalformedPacket(format!("SOAP request host is not an address: {host}")))
}

/// Refresh-with-backoff policy (spec.md §4.7): on a retryable failure, retry
/// with exponential backoff capped at `lifetime/4`; on a non-retryable
/// failure, report `MappingLost`.
pub async fn refresh_with_backoff(ctx: &mut SessionContext<'_>, mapping: &Mapping, cancel: &mut CancellationToken) -> Result<Mapping, Error> {
    let cap = mapping.lifetime / 4;
    let mut backoff = Duration::from_secs(1).min(cap.max(Duration::from_secs(1)));
    loop {
        match refresh(ctx, mapping, cancel).await {
            Ok(refreshed) => return Ok(refreshed),
            Err(err) if is_retryable_for_refresh(&err) && backoff < cap => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                let jitter = 1.0 + rand::thread_rng().gen::<f64>() * 0.25;
                backoff = (backoff * 2).min(cap).mul_f64(jitter).min(cap);
            }
            Err(err) if is_retryable_for_refresh(&err) => {
                return Err(Error::MappingLost(format!("refresh retry budget ({cap:?}) exhausted: {err}")));
            }
            Err(err) => return Err(Error::MappingLost(err.to_string())),
        }
    }
}

fn is_retryable_for_refresh(err: &Error) -> bool {
    matches!(err, Error::Timeout | Error::NetworkFailure(_))
        || matches!(err, Error::Protocol(p) if p.is_retryable())
}
