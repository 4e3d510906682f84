//! Per-interface gateway discovery and mapper construction (spec.md §4.6).
//!
//! Grounded on the `PortMapping`/per-protocol fan-out task pattern in
//! `other_examples/07f7cf45_darkrenaissance-darkfi__src-net-upnp.rs.rs`: one
//! PCP/NAT-PMP probe plus one SSDP M-SEARCH per target service type, run
//! concurrently, joined into the union of constructed [`Mapper`]s.

use crate::config::DiscoveryConfig;
use crate::gateway::{NetworkGateway, UdpSubscription};
use crate::mapper::{sort_by_selection_priority, Mapper};
use crate::pcp::PcpRequest;
use crate::ssdp::{build_m_search, parse_m_search_response, TARGET_SERVICE_TYPES};
use crate::upnp::{parse_http_response, ControlEndpoint};
use std::future::Future;
use std::net::{Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

/// Scans a UPnP device-description document for `<service>` blocks matching
/// one of [`TARGET_SERVICE_TYPES`] (spec.md §4.6 step 3: "locate matching
/// service control and SCPD URLs in the device tree"), resolving each
/// `controlURL` against `base_url`.
///
/// Device descriptions nest `<device>` elements arbitrarily deep; since a
/// `<service>` element never itself contains another `<service>`, a flat scan
/// for every occurrence anywhere in the document is sufficient without a
/// nesting-aware parser.
pub fn parse_device_description(xml: &str, base_url: &str) -> Vec<ControlEndpoint> {
    let Some((host, base_path)) = split_url(base_url) else { return Vec::new() };
    let mut endpoints = Vec::new();
    for block in crate::upnp::find_all_elements(xml, "service") {
        let fields = crate::upnp::parse_flat_children(block);
        let service_type = fields.iter().find(|(k, _)| k == "serviceType").map(|(_, v)| v.clone());
        let control_url = fields.iter().find(|(k, _)| k == "controlURL").map(|(_, v)| v.clone());
        let (Some(service_type), Some(control_url)) = (service_type, control_url) else { continue };
        if !TARGET_SERVICE_TYPES.contains(&service_type.as_str()) {
            continue;
        }
        endpoints.push(ControlEndpoint { host: host.clone(), control_path: resolve_path(&base_path, &control_url), service_type });
    }
    endpoints
}

/// Splits `http://host[:port]/path...` into `(host_authority, path)`.
fn split_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("http://")?;
    let slash = rest.find('/').unwrap_or(rest.len());
    let host = rest[..slash].to_string();
    let path = if slash == rest.len() { "/".to_string() } else { rest[slash..].to_string() };
    Some((host, path))
}

/// Resolves `control_url` against `base_path`: absolute paths and full URLs
/// pass through (with the scheme/host portion of a full URL stripped);
/// relative paths join against `base_path`'s directory.
fn resolve_path(base_path: &str, control_url: &str) -> String {
    if let Some((_, path)) = split_url(control_url) {
        return path;
    }
    if control_url.starts_with('/') {
        return control_url.to_string();
    }
    let dir_end = base_path.rfind('/').map(|i| i + 1).unwrap_or(0);
    format!("{}{}", &base_path[..dir_end], control_url)
}

/// Whether `endpoint`'s service type is the IPv6 firewall-pinhole control
/// service rather than a WAN(PPP) IPv4 connection service.
fn is_v6_pinhole(endpoint: &ControlEndpoint) -> bool {
    endpoint.service_type.contains("WANIPv6FirewallControl")
}

/// Probes one candidate PCP/NAT-PMP gateway address with a PCP `ANNOUNCE`
/// (spec.md §4.6 step 2a). Per §4.6 step 3, any response at all — whichever
/// protocol answers it — means the address accepts both, since the same
/// daemon speaks both wire formats on port 5351; PCP is still tried first
/// at mapping time because `Mapper`'s selection order puts it ahead of
/// NAT-PMP.
async fn probe_port_control(
    network: &dyn NetworkGateway,
    subscription: UdpSubscription,
    addr: SocketAddr,
    client_ip: Ipv6Addr,
    timeout: Duration,
) -> bool {
    let Ok(request) = PcpRequest::announce(client_ip) else { return false };
    if network.send_udp(None, addr, &request.dump()).await.is_err() {
        return false;
    }
    tokio::time::timeout(timeout, network.recv_udp(subscription)).await.is_ok()
}

/// Awaits every future in `futures` concurrently within a single `.await`,
/// polling all of them on each wakeup rather than one after another — a
/// `futures::future::join_all` substitute, since this crate doesn't depend
/// on the `futures` crate.
async fn join_all<T>(mut futures: Vec<Pin<Box<dyn Future<Output = T> + Send + '_>>>) -> Vec<T> {
    let mut results: Vec<Option<T>> = futures.iter().map(|_| None).collect();
    std::future::poll_fn(move |cx| {
        let mut pending = false;
        for (future, slot) in futures.iter_mut().zip(results.iter_mut()) {
            if slot.is_none() {
                match future.as_mut().poll(cx) {
                    Poll::Ready(value) => *slot = Some(value),
                    Poll::Pending => pending = true,
                }
            }
        }
        if pending {
            Poll::Pending
        } else {
            Poll::Ready(results.iter_mut().map(|slot| slot.take().unwrap()).collect())
        }
    })
    .await
}

/// Fetches and parses the device description document at `location`
/// (spec.md §4.6 step 3: "fetch the device description URL").
async fn fetch_device_endpoints(network: &dyn NetworkGateway, location: &str) -> Result<Vec<ControlEndpoint>, crate::error::Error> {
    let (host, path) = split_url(location)
        .ok_or_else(|| crate::error::Error::MalformedPacket(format!("invalid device description URL: {location}")))?;
    let addr: SocketAddr = host
        .parse()
        .map_err(|_| crate::error::Error::MalformedPacket(format!("device description host is not an address: {host}")))?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: Close\r\n\r\n");

    let handle = network.open_tcp(addr).await?;
    network.write_tcp(handle, request.as_bytes()).await?;
    let response_bytes = network.read_tcp(handle).await?;
    network.close_tcp(handle).await?;

    let response = parse_http_response(&response_bytes)?;
    if response.status_code != 200 {
        return Err(crate::error::Error::MalformedPacket(format!(
            "device description fetch returned status {}",
            response.status_code
        )));
    }
    Ok(parse_device_description(&response.body, location))
}

/// Runs discovery for one local interface (spec.md §4.6): probes every
/// candidate PCP/NAT-PMP address, fans an SSDP M-SEARCH for every target
/// service type out to `ssdp_multicast_group`, and joins everything into the
/// union of constructed mappers.
///
/// `port_control_subscription` and `ssdp_subscription` are inbound datagram
/// subscriptions the caller has already set up on sockets bound for this
/// interface (spec.md §6: the core only sends bytes and waits on
/// subscription ids; it never owns a socket).
pub async fn discover(
    network: &dyn NetworkGateway,
    port_control_subscription: UdpSubscription,
    port_control_candidates: &[SocketAddr],
    ssdp_subscription: UdpSubscription,
    ssdp_multicast_group: SocketAddr,
    client_ip: Ipv6Addr,
    config: &DiscoveryConfig,
) -> Vec<Mapper> {
    let probe_candidates = async {
        let probes: Vec<_> = port_control_candidates
            .iter()
            .map(|&addr| {
                let fut: Pin<Box<dyn Future<Output = Option<SocketAddr>> + Send + '_>> = Box::pin(async move {
                    probe_port_control(network, port_control_subscription, addr, client_ip, config.discovery_timeout)
                        .await
                        .then_some(addr)
                });
                fut
            })
            .collect();
        join_all(probes).await.into_iter().flatten().collect::<Vec<_>>()
    };

    let listen_ssdp = async {
        for &service_type in TARGET_SERVICE_TYPES {
            let request = build_m_search(service_type, config.ssdp_mx);
            let _ = network.multicast_send(ssdp_multicast_group, &request).await;
        }

        let mut endpoints = Vec::new();
        let deadline = tokio::time::sleep(config.discovery_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                result = network.recv_udp(ssdp_subscription) => {
                    let Ok((_src, bytes)) = result else { break };
                    let Ok(resp) = parse_m_search_response(&bytes) else { continue };
                    if !TARGET_SERVICE_TYPES.contains(&resp.service_type.as_str()) {
                        continue;
                    }
                    if let Ok(found) = fetch_device_endpoints(network, &resp.location).await {
                        endpoints.extend(found);
                    }
                }
            }
        }
        endpoints
    };

    // spec.md §4.6: the PCP/NAT-PMP probes and the SSDP send+listen share one
    // discovery-timeout budget and run side by side, not one after another.
    let (reachable_candidates, ssdp_endpoints) = tokio::join!(probe_candidates, listen_ssdp);

    let mut mappers = Vec::new();
    for addr in reachable_candidates {
        mappers.push(Mapper::Pcp { addr });
        mappers.push(Mapper::NatPmp { addr });
    }
    for endpoint in ssdp_endpoints {
        if is_v6_pinhole(&endpoint) {
            mappers.push(Mapper::IgdV6Pinhole { endpoint });
        } else {
            mappers.push(Mapper::IgdV4 { endpoint });
        }
    }

    sort_by_selection_priority(&mut mappers);
    mappers
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_DESC: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:WANDevice:1</deviceType>
        <deviceList>
          <device>
            <deviceType>urn:schemas-upnp-org:device:WANConnectionDevice:1</deviceType>
            <serviceList>
              <service>
                <serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>
                <serviceId>urn:upnp-org:serviceId:WANIPConn1</serviceId>
                <controlURL>/upnp/control/WANIPConn1</controlURL>
                <eventSubURL>/upnp/event/WANIPConn1</eventSubURL>
                <SCPDURL>/WANIPConnSCPD.xml</SCPDURL>
              </service>
              <service>
                <serviceType>urn:schemas-upnp-org:service:Layer3Forwarding:1</serviceType>
                <serviceId>urn:upnp-org:serviceId:L3Forwarding1</serviceId>
                <controlURL>/upnp/control/L3Forwarding1</controlURL>
                <eventSubURL>/upnp/event/L3Forwarding1</eventSubURL>
                <SCPDURL>/Layer3SCPD.xml</SCPDURL>
              </service>
            </serviceList>
          </device>
        </deviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

    #[test]
    fn finds_the_wan_ip_connection_service_and_skips_others() {
        let endpoints = parse_device_description(ROOT_DESC, "http://192.168.1.1:1780/rootDesc.xml");
        assert_eq!(endpoints.len(), 1);
        let endpoint = &endpoints[0];
        assert_eq!(endpoint.host, "192.168.1.1:1780");
        assert_eq!(endpoint.control_path, "/upnp/control/WANIPConn1");
        assert_eq!(endpoint.service_type, "urn:schemas-upnp-org:service:WANIPConnection:1");
    }

    #[test]
    fn resolves_relative_control_urls_against_the_description_directory() {
        let xml = r#"<service>
            <serviceType>urn:schemas-upnp-org:service:WANPPPConnection:1</serviceType>
            <controlURL>control/wanppp</controlURL>
        </service>"#;
        let endpoints = parse_device_description(xml, "http://10.0.0.1:5000/desc/root.xml");
        assert_eq!(endpoints[0].control_path, "/desc/control/wanppp");
    }

    #[test]
    fn classifies_firewall_control_service_as_v6_pinhole() {
        let xml = r#"<service>
            <serviceType>urn:schemas-upnp-org:service:WANIPv6FirewallControl:1</serviceType>
            <controlURL>/upnp/control/WANIPv6Firewall1</controlURL>
        </service>"#;
        let endpoints = parse_device_description(xml, "http://[fe80::1]:1780/rootDesc.xml");
        assert_eq!(endpoints.len(), 1);
        assert!(is_v6_pinhole(&endpoints[0]));
    }

    struct DeafGateway;

    #[async_trait::async_trait]
    impl NetworkGateway for DeafGateway {
        async fn send_udp(&self, _src: Option<std::net::IpAddr>, _dst: SocketAddr, _bytes: &[u8]) -> Result<(), crate::error::Error> {
            Ok(())
        }
        async fn recv_udp(&self, _subscription: UdpSubscription) -> Result<(SocketAddr, Vec<u8>), crate::error::Error> {
            std::future::pending().await
        }
        async fn open_tcp(&self, _dst: SocketAddr) -> Result<crate::gateway::TcpHandle, crate::error::Error> {
            std::future::pending().await
        }
        async fn write_tcp(&self, _handle: crate::gateway::TcpHandle, _bytes: &[u8]) -> Result<(), crate::error::Error> {
            std::future::pending().await
        }
        async fn read_tcp(&self, _handle: crate::gateway::TcpHandle) -> Result<Vec<u8>, crate::error::Error> {
            std::future::pending().await
        }
        async fn close_tcp(&self, _handle: crate::gateway::TcpHandle) -> Result<(), crate::error::Error> {
            Ok(())
        }
        async fn multicast_send(&self, _group: SocketAddr, _bytes: &[u8]) -> Result<(), crate::error::Error> {
            Ok(())
        }
        async fn multicast_recv(&self, _group: SocketAddr) -> Result<(std::net::IpAddr, Vec<u8>), crate::error::Error> {
            std::future::pending().await
        }
    }

    /// spec.md §4.6: probing N candidates and listening for SSDP must share
    /// one discovery-timeout budget, not take `(N + 1) * timeout` wall-clock.
    #[tokio::test(start_paused = true)]
    async fn discovery_with_many_candidates_takes_one_timeout_not_n_plus_one() {
        let candidates: Vec<SocketAddr> =
            (0..5).map(|i| SocketAddr::from(([192, 168, 1, 1 + i as u8], 5351))).collect();
        let config = DiscoveryConfig { discovery_timeout: Duration::from_millis(100), ssdp_mx: 1 };

        let start = tokio::time::Instant::now();
        let mappers = discover(
            &DeafGateway,
            UdpSubscription(0),
            &candidates,
            UdpSubscription(1),
            "239.255.255.250:1900".parse().unwrap(),
            "::ffff:192.168.1.101".parse().unwrap(),
            &config,
        )
        .await;

        assert!(mappers.is_empty());
        assert!(start.elapsed() < Duration::from_millis(200), "elapsed {:?} suggests sequential probing", start.elapsed());
    }
}
