//! # Binding Dialer
//!
//! Outbound connection establishment with a chosen source address.
//!
//! For every IPv6 destination the [`SourceAddressChooser`] runs first (on
//! the blocking pool, it talks to the kernel) and the new socket is bound
//! to `[chosen]:0` before connect. IPv4 destinations are dialed unchanged.
//!
//! ## Failure policy
//!
//! - Selection or bind failures abort the whole dial. There is no fallback
//!   to the kernel's default source address.
//! - Connect failures (and timeouts) move on to the next resolved address;
//!   the last one is returned when all fail.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, TcpSocket, TcpStream, UdpSocket};
use tracing::debug;

use crate::domain::SelectionError;
use crate::ports::inbound::SourceAddressChooser;

// =============================================================================
// NETWORK
// =============================================================================

/// Transport and address family accepted by [`BindingDialer::dial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
}

impl Network {
    pub fn is_stream(self) -> bool {
        matches!(self, Self::Tcp | Self::Tcp4 | Self::Tcp6)
    }

    fn accepts(self, remote: &SocketAddr) -> bool {
        match self {
            Self::Tcp | Self::Udp => true,
            Self::Tcp4 | Self::Udp4 => remote.is_ipv4(),
            Self::Tcp6 | Self::Udp6 => remote.is_ipv6(),
        }
    }
}

impl FromStr for Network {
    type Err = DialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "tcp4" => Ok(Self::Tcp4),
            "tcp6" => Ok(Self::Tcp6),
            "udp" => Ok(Self::Udp),
            "udp4" => Ok(Self::Udp4),
            "udp6" => Ok(Self::Udp6),
            other => Err(DialError::UnsupportedNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
            Self::Udp => "udp",
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
        };
        f.write_str(name)
    }
}

// =============================================================================
// CONNECTION & ERRORS
// =============================================================================

/// An established outbound connection.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Connection {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::Tcp(stream) => stream.local_addr(),
            Self::Udp(socket) => socket.local_addr(),
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::Tcp(stream) => stream.peer_addr(),
            Self::Udp(socket) => socket.peer_addr(),
        }
    }

    pub fn into_tcp(self) -> Option<TcpStream> {
        match self {
            Self::Tcp(stream) => Some(stream),
            Self::Udp(_) => None,
        }
    }

    pub fn into_udp(self) -> Option<UdpSocket> {
        match self {
            Self::Udp(socket) => Some(socket),
            Self::Tcp(_) => None,
        }
    }
}

/// Dial failures, one per attempt.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("invalid address {0:?}: expected host:port")]
    InvalidAddress(String),

    #[error("unsupported network {0:?}")]
    UnsupportedNetwork(String),

    #[error("resolving {host} failed: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("no {network} address for {address}")]
    NoSuitableAddress { network: Network, address: String },

    #[error("source address selection for {destination} failed: {source}")]
    Selection {
        destination: Ipv6Addr,
        #[source]
        source: SelectionError,
    },

    #[error("creating socket failed: {0}")]
    Socket(#[source] io::Error),

    #[error("binding to {local} failed: {source}")]
    Bind {
        local: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("connecting to {remote} failed: {source}")]
    Connect {
        remote: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("connecting to {remote} timed out after {after:?}")]
    Timeout { remote: SocketAddr, after: Duration },
}

impl DialError {
    /// Failures after which the next resolved address is tried.
    fn tries_next(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout { .. })
    }
}

// =============================================================================
// DIALER
// =============================================================================

/// Dialer binding IPv6 sockets to the chooser's pick before connect.
#[derive(Clone)]
pub struct BindingDialer {
    chooser: Arc<dyn SourceAddressChooser>,
    connect_timeout: Option<Duration>,
}

impl BindingDialer {
    pub fn new(chooser: Arc<dyn SourceAddressChooser>) -> Self {
        Self {
            chooser,
            connect_timeout: None,
        }
    }

    /// Bound each connect attempt. Zero disables the bound.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Dial with the network given by name (`tcp`, `udp6`, ...).
    pub async fn dial_str(&self, network: &str, address: &str) -> Result<Connection, DialError> {
        self.dial(network.parse()?, address).await
    }

    /// Connect to `address` (`host:port`, IP literal or hostname).
    pub async fn dial(&self, network: Network, address: &str) -> Result<Connection, DialError> {
        let remotes = resolve(network, address).await?;
        self.dial_each(network, address, remotes).await
    }

    /// Try `remotes` in order until one connects.
    async fn dial_each(
        &self,
        network: Network,
        address: &str,
        remotes: Vec<SocketAddr>,
    ) -> Result<Connection, DialError> {
        let mut last_error = None;
        for remote in remotes {
            match self.dial_one(network, remote).await {
                Ok(connection) => return Ok(connection),
                Err(e) if e.tries_next() => {
                    debug!(%remote, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| DialError::NoSuitableAddress {
            network,
            address: address.to_string(),
        }))
    }

    async fn dial_one(&self, network: Network, remote: SocketAddr) -> Result<Connection, DialError> {
        let local = match remote {
            SocketAddr::V6(v6) => {
                let chosen = self.choose(*v6.ip()).await?;
                SocketAddr::V6(SocketAddrV6::new(chosen, 0, 0, 0))
            }
            SocketAddr::V4(_) => SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
        };

        if network.is_stream() {
            let socket = match remote {
                SocketAddr::V6(_) => {
                    let socket = TcpSocket::new_v6().map_err(DialError::Socket)?;
                    socket
                        .bind(local)
                        .map_err(|source| DialError::Bind { local, source })?;
                    socket
                }
                SocketAddr::V4(_) => TcpSocket::new_v4().map_err(DialError::Socket)?,
            };
            let stream = self.bounded(remote, socket.connect(remote)).await?;
            Ok(Connection::Tcp(stream))
        } else {
            let socket = UdpSocket::bind(local)
                .await
                .map_err(|source| DialError::Bind { local, source })?;
            self.bounded(remote, socket.connect(remote)).await?;
            Ok(Connection::Udp(socket))
        }
    }

    async fn choose(&self, destination: Ipv6Addr) -> Result<Ipv6Addr, DialError> {
        let chooser = Arc::clone(&self.chooser);
        let chosen = tokio::task::spawn_blocking(move || chooser.choose(destination))
            .await
            .unwrap_or_else(|e| Err(SelectionError::Aborted(e.to_string())))
            .map_err(|source| DialError::Selection {
                destination,
                source,
            })?;
        debug!(%destination, source = %chosen, "binding outbound socket");
        Ok(chosen)
    }

    async fn bounded<T>(
        &self,
        remote: SocketAddr,
        attempt: impl Future<Output = io::Result<T>>,
    ) -> Result<T, DialError> {
        let outcome = match self.connect_timeout {
            Some(after) => tokio::time::timeout(after, attempt)
                .await
                .map_err(|_| DialError::Timeout { remote, after })?,
            None => attempt.await,
        };
        outcome.map_err(|source| DialError::Connect { remote, source })
    }
}

/// Turn `host:port` into the destinations the network accepts.
///
/// IP literals are used as-is (IPv4-mapped IPv6 becomes IPv4); hostnames
/// go through the system resolver.
async fn resolve(network: Network, address: &str) -> Result<Vec<SocketAddr>, DialError> {
    let candidates: Vec<SocketAddr> = match address.parse::<SocketAddr>() {
        Ok(literal) => vec![literal],
        Err(_) => {
            let (host, port) = split_host_port(address)?;
            lookup_host((host, port))
                .await
                .map_err(|source| DialError::Resolve {
                    host: host.to_string(),
                    source,
                })?
                .collect()
        }
    };

    let remotes: Vec<SocketAddr> = candidates
        .into_iter()
        .map(unmap)
        .filter(|remote| network.accepts(remote))
        .collect();

    if remotes.is_empty() {
        return Err(DialError::NoSuitableAddress {
            network,
            address: address.to_string(),
        });
    }
    Ok(remotes)
}

fn split_host_port(address: &str) -> Result<(&str, u16), DialError> {
    let invalid = || DialError::InvalidAddress(address.to_string());
    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() || host.contains(':') {
        return Err(invalid());
    }
    let port = port.parse().map_err(|_| invalid())?;
    Ok((host, port))
}

fn unmap(remote: SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::V4(SocketAddrV4::new(v4, v6.port())),
            None => remote,
        },
        SocketAddr::V4(_) => remote,
    }
}
