//! A client-side port-mapping library speaking NAT-PMP, PCP and UPnP-IGD.
//!
//! Lets an application behind a consumer NAT/firewall gateway request that an
//! external port be forwarded to one of its internal sockets, by speaking
//! whichever of the three competing protocols the gateway actually
//! implements:
//!
//! - **NAT-PMP** ([RFC 6886](https://www.rfc-editor.org/rfc/rfc6886))
//! - **PCP** ([RFC 6887](https://www.rfc-editor.org/rfc/rfc6887))
//! - **UPnP-IGD** (versions 1 and 2, including the IPv6 firewall-pinhole
//!   profile)
//!
//! [`discovery::discover`] probes an interface for reachable gateways and
//! ranks them by [`mapper::Mapper::selection_priority`]; [`session`] drives
//! the wire exchange for whichever protocol a [`mapper::Mapper`] names;
//! [`client::PortMapper`] is the façade tying the two together behind
//! `map`/`refresh`/`unmap`.
//!
//! This crate never touches a socket directly: all I/O goes through the
//! injected [`gateway::NetworkGateway`] (and, for enumerating local routing
//! tables, [`gateway::ProcessGateway`]), so embedders can run this on top of
//! `tokio`, an existing event loop, or a test double.
//!
//! # Getting started
//!
//! ```no_run
//! use gwmap::cancel::cancellation_pair;
//! use gwmap::client::{InterfaceConfig, PortMapper};
//! use gwmap::config::{DiscoveryConfig, RetryConfig};
//! use gwmap::gateway::{NetworkGateway, UdpSubscription};
//! use gwmap::protocol::PortType;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run(network: Arc<dyn NetworkGateway>, udp_responses: tokio::sync::mpsc::Receiver<Vec<u8>>) -> Result<(), gwmap::error::Error> {
//! let interface = InterfaceConfig {
//!     client_ip: "::ffff:192.168.1.101".parse().unwrap(),
//!     port_control_candidates: vec!["192.168.1.1:5351".parse().unwrap()],
//!     ssdp_multicast_group: "239.255.255.250:1900".parse().unwrap(),
//! };
//! let mut mapper = PortMapper::new(
//!     network,
//!     interface,
//!     UdpSubscription(0),
//!     UdpSubscription(1),
//!     udp_responses,
//!     RetryConfig::default(),
//!     DiscoveryConfig::default(),
//! );
//!
//! let (_cancel_source, mut cancel) = cancellation_pair();
//! let mapping = mapper.map(6000, 6000, PortType::Tcp, Duration::from_secs(3600), &mut cancel).await?;
//! println!("mapped to {}:{}", mapping.external_ip, mapping.external_port);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod client;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod mapper;
pub mod natpmp;
pub mod pcp;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod ssdp;
pub mod upnp;

pub use client::PortMapper;
pub use error::Error;
pub use mapper::Mapper;
pub use protocol::PortType;
pub use session::Mapping;
