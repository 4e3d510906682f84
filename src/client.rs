//! The top-level façade (spec.md §1: "the top-level orchestration that picks
//! any mapper and exposes a simple map/unmap/refresh façade"): wires
//! discovery and the mapping session together over an injected
//! [`NetworkGateway`].

use crate::cancel::CancellationToken;
use crate::config::{DiscoveryConfig, RetryConfig};
use crate::discovery;
use crate::error::Error;
use crate::gateway::{NetworkGateway, UdpSubscription};
use crate::mapper::Mapper;
use crate::protocol::PortType;
use crate::retry::RetryController;
use crate::session::{self, Mapping, SessionContext};
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Where to probe for gateways on one local interface (spec.md §4.6 step 1).
///
/// RFC 7488's automatic PCP client/server address selection is out of scope,
/// same as the teacher (`Client::start`'s doc comment: "not (yet)
/// implemented... addresses have to be set manually"); the caller resolves
/// these from the interface's own configuration, typically the default
/// gateway address.
#[derive(Clone, Debug)]
pub struct InterfaceConfig {
    pub client_ip: Ipv6Addr,
    pub port_control_candidates: Vec<SocketAddr>,
    pub ssdp_multicast_group: SocketAddr,
}

/// Discovers gateways on one interface and exposes `map`/`unmap`/`refresh`
/// against whichever mapper selection picks (spec.md §4.6 "Selection",
/// §4.7).
///
/// The caller owns the socket plumbing (spec.md §6: the core never owns a
/// socket): `udp_responses` must be fed by repeatedly forwarding
/// `network.recv_udp(port_control_subscription)` results into the channel,
/// so the retry controller driving `map`/`refresh`/`unmap` can consume them
/// while this façade issues its own requests.
pub struct PortMapper {
    network: Arc<dyn NetworkGateway>,
    retry: RetryController,
    interface: InterfaceConfig,
    port_control_subscription: UdpSubscription,
    ssdp_subscription: UdpSubscription,
    discovery_config: DiscoveryConfig,
    udp_responses: mpsc::Receiver<Vec<u8>>,
}

impl PortMapper {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: Arc<dyn NetworkGateway>,
        interface: InterfaceConfig,
        port_control_subscription: UdpSubscription,
        ssdp_subscription: UdpSubscription,
        udp_responses: mpsc::Receiver<Vec<u8>>,
        retry_config: RetryConfig,
        discovery_config: DiscoveryConfig,
    ) -> Self {
        Self {
            network,
            retry: RetryController::new(retry_config),
            interface,
            port_control_subscription,
            ssdp_subscription,
            discovery_config,
            udp_responses,
        }
    }

    /// Discovers every mapper reachable on this interface, already sorted
    /// into spec.md §4.6 selection order.
    pub async fn discover(&self) -> Vec<Mapper> {
        discovery::discover(
            self.network.as_ref(),
            self.port_control_subscription,
            &self.interface.port_control_candidates,
            self.ssdp_subscription,
            self.interface.ssdp_multicast_group,
            self.interface.client_ip,
            &self.discovery_config,
        )
        .await
    }

    /// Requests a mapping (spec.md §4.7 `create`): discovers mappers, then
    /// tries each in selection order, returning the first success. If every
    /// mapper fails, returns `Unsupported` wrapping the last error
    /// encountered (spec.md §7).
    pub async fn map(
        &mut self,
        internal_port: u16,
        preferred_external_port: u16,
        protocol: PortType,
        lifetime: Duration,
        cancel: &mut CancellationToken,
    ) -> Result<Mapping, Error> {
        let mappers = self.discover().await;
        let mut last_err = None;
        for mapper in &mappers {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut ctx = self.context();
            match session::create(&mut ctx, mapper, internal_port, preferred_external_port, protocol, lifetime, cancel).await {
                Ok(mapping) => return Ok(mapping),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    tracing::debug!(%mapper, error = %err, "mapper failed, trying next");
                    last_err = Some(err);
                }
            }
        }
        Err(Error::Unsupported(Box::new(last_err.unwrap_or(Error::Timeout))))
    }

    /// Refreshes a mapping before it expires (spec.md §4.7 `refresh`),
    /// following the backoff policy in [`session::refresh_with_backoff`].
    pub async fn refresh(&mut self, mapping: &Mapping, cancel: &mut CancellationToken) -> Result<Mapping, Error> {
        let mut ctx = self.context();
        session::refresh_with_backoff(&mut ctx, mapping, cancel).await
    }

    /// Releases a mapping on the gateway (spec.md §4.7 `release`).
    pub async fn unmap(&mut self, mapping: &Mapping, cancel: &mut CancellationToken) -> Result<(), Error> {
        let mut ctx = self.context();
        session::release(&mut ctx, mapping, cancel).await
    }

    fn context(&mut self) -> SessionContext<'_> {
        SessionContext {
            network: self.network.as_ref(),
            retry: &self.retry,
            client_ip: self.interface.client_ip,
            udp_subscription: self.port_control_subscription,
            udp_responses: &mut self.udp_responses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct DeafGateway;

    #[async_trait]
    impl NetworkGateway for DeafGateway {
        async fn send_udp(&self, _src_interface: Option<std::net::IpAddr>, _dst: SocketAddr, _bytes: &[u8]) -> Result<(), Error> {
            Ok(())
        }
        async fn recv_udp(&self, _subscription: UdpSubscription) -> Result<(SocketAddr, Vec<u8>), Error> {
            std::future::pending().await
        }
        async fn open_tcp(&self, _dst: SocketAddr) -> Result<crate::gateway::TcpHandle, Error> {
            Err(Error::NetworkFailure("no TCP in this test double".into()))
        }
        async fn write_tcp(&self, _handle: crate::gateway::TcpHandle, _bytes: &[u8]) -> Result<(), Error> {
            Err(Error::NetworkFailure("no TCP in this test double".into()))
        }
        async fn read_tcp(&self, _handle: crate::gateway::TcpHandle) -> Result<Vec<u8>, Error> {
            Err(Error::NetworkFailure("no TCP in this test double".into()))
        }
        async fn close_tcp(&self, _handle: crate::gateway::TcpHandle) -> Result<(), Error> {
            Ok(())
        }
        async fn multicast_send(&self, _group: SocketAddr, _bytes: &[u8]) -> Result<(), Error> {
            Ok(())
        }
        async fn multicast_recv(&self, _group: SocketAddr) -> Result<(std::net::IpAddr, Vec<u8>), Error> {
            std::future::pending().await
        }
    }

    fn mapper(discovery_timeout: Duration) -> PortMapper {
        let (_tx, rx) = mpsc::channel(1);
        PortMapper::new(
            Arc::new(DeafGateway),
            InterfaceConfig {
                client_ip: "::ffff:192.168.1.101".parse().unwrap(),
                port_control_candidates: vec!["192.168.1.1:5351".parse().unwrap()],
                ssdp_multicast_group: "239.255.255.250:1900".parse().unwrap(),
            },
            UdpSubscription(0),
            UdpSubscription(1),
            rx,
            RetryConfig::default(),
            DiscoveryConfig { discovery_timeout, ssdp_mx: 1 },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn discover_returns_nothing_when_every_probe_times_out() {
        let client = mapper(Duration::from_millis(50));
        assert!(client.discover().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn map_reports_unsupported_when_no_mapper_is_discovered() {
        let mut client = mapper(Duration::from_millis(50));
        let mut cancel = CancellationToken::never();
        let err = client.map(6000, 6000, PortType::Tcp, Duration::from_secs(3600), &mut cancel).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
