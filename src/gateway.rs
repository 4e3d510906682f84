//! External collaborator interfaces the core consumes rather than
//! implements (spec.md §1, §6): network I/O and local process invocation.
//! The core never calls sockets directly; mutexes never appear inside it.

use crate::error::Error;
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};

/// An opaque handle to an open TCP connection, owned by whatever implements
/// [`NetworkGateway`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TcpHandle(pub u64);

/// An opaque subscription id identifying one `recvUdp` multiplexing stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UdpSubscription(pub u64);

/// The network I/O gateway (spec.md §1, §6): an actor owning UDP unicast,
/// UDP multicast and TCP sockets. The core hands it bytes and addresses and
/// gets bytes back; it never touches a socket.
#[async_trait]
pub trait NetworkGateway: Send + Sync {
    async fn send_udp(&self, src_interface: Option<IpAddr>, dst: SocketAddr, bytes: &[u8]) -> Result<(), Error>;

    /// Receives the next datagram multiplexed onto `subscription`, returning
    /// the sender's address and the payload.
    async fn recv_udp(&self, subscription: UdpSubscription) -> Result<(SocketAddr, Vec<u8>), Error>;

    async fn open_tcp(&self, dst: SocketAddr) -> Result<TcpHandle, Error>;
    async fn write_tcp(&self, handle: TcpHandle, bytes: &[u8]) -> Result<(), Error>;
    async fn read_tcp(&self, handle: TcpHandle) -> Result<Vec<u8>, Error>;
    async fn close_tcp(&self, handle: TcpHandle) -> Result<(), Error>;

    async fn multicast_send(&self, group: SocketAddr, bytes: &[u8]) -> Result<(), Error>;
    async fn multicast_recv(&self, group: SocketAddr) -> Result<(IpAddr, Vec<u8>), Error>;
}

/// The result of running an external command via [`ProcessGateway`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// The process gateway (spec.md §1, §6): runs external commands (`netstat`,
/// `ip route`, `ipconfig`) to enumerate local gateway candidates when
/// platform APIs are unsuitable. The core only issues requests and parses
/// output; it never spawns a process itself.
#[async_trait]
pub trait ProcessGateway: Send + Sync {
    async fn run(&self, command: &str, args: &[&str]) -> Result<CommandOutput, Error>;
}
