//! # SOCKS5 Front End
//!
//! No-auth SOCKS5 server whose outbound connections go through the
//! [`BindingDialer`]. Only CONNECT is served. Domain targets are resolved by
//! the dialer, so hostnames get a chosen source address like literals do.

use std::io;
use std::net::SocketAddr;

use fast_socks5::server::Socks5ServerProtocol;
use fast_socks5::util::target_addr::TargetAddr;
use fast_socks5::{ReplyError, Socks5Command, SocksError};
use rsip_selection::{BindingDialer, DialError, Network, RouteError, SelectionError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Listening SOCKS5 server.
pub struct SocksServer {
    listener: TcpListener,
    dialer: BindingDialer,
}

impl SocksServer {
    pub async fn bind(addr: SocketAddr, dialer: BindingDialer) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, dialer })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop on its own task.
    pub fn spawn(self) -> ServerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.serve(shutdown_rx));
        ServerHandle { shutdown_tx, task }
    }

    /// Accept clients until `shutdown` flips or its sender drops.
    ///
    /// Client tasks still running at shutdown are aborted.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        let mut clients = JoinSet::new();
        info!(addr = ?self.listener.local_addr().ok(), "SOCKS5 server listening");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("SOCKS5 server shutdown signal received");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, client)) => {
                        debug!(%client, "client connected");
                        let dialer = self.dialer.clone();
                        clients.spawn(async move {
                            if let Err(e) = handle_client(stream, dialer).await {
                                warn!(%client, error = %e, "client session failed");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                Some(joined) = clients.join_next(), if !clients.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "client task ended abnormally");
                    }
                }
            }
        }

        clients.shutdown().await;
        info!("SOCKS5 server stopped");
    }
}

/// Handle to a spawned server.
pub struct ServerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting, abort client sessions and wait for the loop to end.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "SOCKS5 server task ended abnormally");
        }
    }
}

async fn handle_client(stream: TcpStream, dialer: BindingDialer) -> Result<(), SocksError> {
    let proto = Socks5ServerProtocol::accept_no_auth(stream).await?;
    let (proto, cmd, target) = proto.read_command().await?;

    if !matches!(cmd, Socks5Command::TCPConnect) {
        proto.reply_error(&ReplyError::CommandNotSupported).await?;
        return Err(ReplyError::CommandNotSupported.into());
    }

    let address = dial_target(&target);
    let connection = match dialer.dial(Network::Tcp, &address).await {
        Ok(connection) => connection,
        Err(e) => {
            let reply = reply_for(&e);
            warn!(target = %address, error = %e, "outbound dial failed");
            proto.reply_error(&reply).await?;
            return Err(reply.into());
        }
    };

    let Some(mut outbound) = connection.into_tcp() else {
        proto.reply_error(&ReplyError::GeneralFailure).await?;
        return Err(ReplyError::GeneralFailure.into());
    };
    let bound = outbound.local_addr()?;
    info!(target = %address, source = %bound, "relaying");

    let mut inbound = proto.reply_success(bound).await?;
    match tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await {
        Ok((up, down)) => debug!(target = %address, up, down, "relay finished"),
        Err(e) => debug!(target = %address, error = %e, "relay ended with error"),
    }
    Ok(())
}

/// `host:port` string for the dialer. IPv6 hosts get brackets.
fn dial_target(target: &TargetAddr) -> String {
    match target {
        TargetAddr::Ip(addr) => addr.to_string(),
        TargetAddr::Domain(host, port) if host.contains(':') => format!("[{host}]:{port}"),
        TargetAddr::Domain(host, port) => format!("{host}:{port}"),
    }
}

/// SOCKS5 reply code for a failed dial.
fn reply_for(error: &DialError) -> ReplyError {
    match error {
        DialError::Resolve { .. } | DialError::NoSuitableAddress { .. } => {
            ReplyError::HostUnreachable
        }
        DialError::Selection {
            source: SelectionError::Route(RouteError::NoRoute(_)),
            ..
        } => ReplyError::NetworkUnreachable,
        DialError::Connect { source, .. } if source.kind() == io::ErrorKind::ConnectionRefused => {
            ReplyError::ConnectionRefused
        }
        DialError::Connect { .. } => ReplyError::HostUnreachable,
        DialError::Timeout { .. } => ReplyError::TtlExpired,
        _ => ReplyError::GeneralFailure,
    }
}
