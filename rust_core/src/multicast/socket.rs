//! Multicast sockets
//!
//! `SocketFactory` is the seam between the client and the network: the real
//! implementation opens socket2-configured tokio sockets, tests substitute an
//! in-memory one.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// One joined multicast group.
#[async_trait]
pub trait DatagramSource: Send + Sync {
    /// Receive one datagram into `buf`, returning its length
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Group address and port this source is joined to
    fn group(&self) -> SocketAddrV4;

    /// Leave the group. Dropping the source also leaves it.
    fn leave(&self) -> io::Result<()> {
        Ok(())
    }
}

pub trait SocketFactory: Send + Sync {
    /// Map an interface name (or IPv4 literal) to the address used for joins
    fn resolve_interface(&self, interface: &str) -> Result<Ipv4Addr>;

    /// Open a socket on `port` and join `group` on `interface`
    fn join(&self, group: Ipv4Addr, port: u16, interface: Ipv4Addr) -> Result<Arc<dyn DatagramSource>>;
}

/// Real UDP multicast sockets.
#[derive(Debug, Clone)]
pub struct UdpMulticastFactory {
    recv_buffer_bytes: usize,
}

impl UdpMulticastFactory {
    pub fn new(recv_buffer_bytes: usize) -> Self {
        Self { recv_buffer_bytes }
    }
}

impl Default for UdpMulticastFactory {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RECV_BUFFER_BYTES)
    }
}

impl SocketFactory for UdpMulticastFactory {
    fn resolve_interface(&self, interface: &str) -> Result<Ipv4Addr> {
        if let Ok(ip) = interface.parse::<Ipv4Addr>() {
            return Ok(ip);
        }

        let addrs = if_addrs::get_if_addrs().context("Failed to list network interfaces")?;
        addrs
            .iter()
            .filter(|iface| iface.name == interface)
            .find_map(|iface| match iface.ip() {
                std::net::IpAddr::V4(ip) => Some(ip),
                std::net::IpAddr::V6(_) => None,
            })
            .ok_or_else(|| anyhow!("No IPv4 address on interface '{}'", interface))
    }

    fn join(&self, group: Ipv4Addr, port: u16, interface: Ipv4Addr) -> Result<Arc<dyn DatagramSource>> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .with_context(|| format!("Failed to create socket for {}:{}", group, port))?;

        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        if let Err(e) = socket.set_recv_buffer_size(self.recv_buffer_bytes) {
            warn!("Could not set receive buffer to {} bytes: {}", self.recv_buffer_bytes, e);
        }

        // Binding to the group address filters out other groups on the same port
        #[cfg(unix)]
        let bind_ip = group;
        #[cfg(not(unix))]
        let bind_ip = Ipv4Addr::UNSPECIFIED;
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(bind_ip, port));
        socket
            .bind(&bind_addr.into())
            .with_context(|| format!("Failed to bind {}", bind_addr))?;

        socket.set_nonblocking(true)?;
        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;

        socket
            .join_multicast_v4(group, interface)
            .with_context(|| format!("Failed to join multicast {} on {}", group, interface))?;

        info!("Joined {}:{} on {}", group, port, interface);
        Ok(Arc::new(UdpMulticastSource {
            socket,
            group: SocketAddrV4::new(group, port),
            interface,
        }))
    }
}

struct UdpMulticastSource {
    socket: UdpSocket,
    group: SocketAddrV4,
    interface: Ipv4Addr,
}

#[async_trait]
impl DatagramSource for UdpMulticastSource {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf).await
    }

    fn group(&self) -> SocketAddrV4 {
        self.group
    }

    fn leave(&self) -> io::Result<()> {
        debug!("Leaving {}", self.group);
        self.socket.leave_multicast_v4(*self.group.ip(), self.interface)
    }
}
