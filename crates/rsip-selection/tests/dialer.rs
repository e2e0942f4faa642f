//! Binding dialer against loopback listeners.
//!
//! IPv6 cases are skipped when `::1` cannot be bound (IPv6 disabled in the
//! sandbox).

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rsip_selection::{
    BindingDialer, Connection, DialError, InterfaceIndex, Network, SelectionError,
    SourceAddressChooser,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

/// Chooser answering with a fixed address and recording every call.
struct RecordingChooser {
    answer: Option<Ipv6Addr>,
    calls: Mutex<Vec<Ipv6Addr>>,
}

impl RecordingChooser {
    fn answering(answer: Ipv6Addr) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(answer),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Ipv6Addr> {
        self.calls.lock().clone()
    }
}

impl SourceAddressChooser for RecordingChooser {
    fn choose(&self, destination: Ipv6Addr) -> Result<Ipv6Addr, SelectionError> {
        self.calls.lock().push(destination);
        self.answer
            .ok_or(SelectionError::NoCandidates(InterfaceIndex::new(1)))
    }
}

async fn ipv6_listener() -> Option<TcpListener> {
    TcpListener::bind("[::1]:0").await.ok()
}

#[tokio::test]
async fn test_ipv6_dial_binds_chosen_address() {
    let Some(listener) = ipv6_listener().await else {
        eprintln!("skipping: ::1 not bindable");
        return;
    };
    let target = listener.local_addr().unwrap();
    let chooser = RecordingChooser::answering(Ipv6Addr::LOCALHOST);
    let dialer = BindingDialer::new(chooser.clone()).with_connect_timeout(Duration::from_secs(5));

    let accept = tokio::spawn(async move {
        let (mut stream, peer) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        (peer, buf)
    });

    let connection = dialer.dial(Network::Tcp, &target.to_string()).await.unwrap();
    assert_eq!(
        connection.local_addr().unwrap().ip(),
        IpAddr::V6(Ipv6Addr::LOCALHOST)
    );
    assert_eq!(connection.peer_addr().unwrap(), target);

    let mut stream = connection.into_tcp().unwrap();
    stream.write_all(b"ping").await.unwrap();

    let (peer, buf) = accept.await.unwrap();
    assert_eq!(peer.ip(), IpAddr::V6(Ipv6Addr::LOCALHOST));
    assert_eq!(&buf, b"ping");
    assert_eq!(chooser.calls(), vec![Ipv6Addr::LOCALHOST]);
}

#[tokio::test]
async fn test_ipv4_dial_skips_chooser() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    let chooser = RecordingChooser::failing();
    let dialer = BindingDialer::new(chooser.clone());

    let accept = tokio::spawn(async move { listener.accept().await.map(|(_, peer)| peer) });

    let connection = dialer.dial_str("tcp4", &target.to_string()).await.unwrap();
    assert!(matches!(connection, Connection::Tcp(_)));
    assert!(accept.await.unwrap().is_ok());
    assert!(chooser.calls().is_empty());
}

#[tokio::test]
async fn test_chooser_failure_aborts_dial() {
    let Some(listener) = ipv6_listener().await else {
        eprintln!("skipping: ::1 not bindable");
        return;
    };
    let target = listener.local_addr().unwrap();
    let chooser = RecordingChooser::failing();
    let dialer = BindingDialer::new(chooser.clone());

    let err = dialer.dial(Network::Tcp6, &target.to_string()).await.unwrap_err();
    assert!(matches!(
        err,
        DialError::Selection {
            source: SelectionError::NoCandidates(_),
            ..
        }
    ));
    assert_eq!(chooser.calls().len(), 1);
}

#[tokio::test]
async fn test_bind_failure_aborts_dial() {
    let Some(listener) = ipv6_listener().await else {
        eprintln!("skipping: ::1 not bindable");
        return;
    };
    let target = listener.local_addr().unwrap();
    // Documentation prefix: never configured locally.
    let chooser = RecordingChooser::answering("2001:db8::dead".parse().unwrap());
    let dialer = BindingDialer::new(chooser);

    let err = dialer.dial(Network::Tcp, &target.to_string()).await.unwrap_err();
    assert!(matches!(err, DialError::Bind { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let Some(listener) = ipv6_listener().await else {
        eprintln!("skipping: ::1 not bindable");
        return;
    };
    let target = listener.local_addr().unwrap();
    drop(listener);

    let chooser = RecordingChooser::answering(Ipv6Addr::LOCALHOST);
    let dialer = BindingDialer::new(chooser.clone());

    let err = dialer.dial(Network::Tcp, &target.to_string()).await.unwrap_err();
    assert!(matches!(err, DialError::Connect { .. }), "got {err:?}");
    assert_eq!(chooser.calls().len(), 1);
}

#[tokio::test]
async fn test_udp6_dial_binds_chosen_address() {
    let Ok(server) = UdpSocket::bind("[::1]:0").await else {
        eprintln!("skipping: ::1 not bindable");
        return;
    };
    let target = server.local_addr().unwrap();
    let chooser = RecordingChooser::answering(Ipv6Addr::LOCALHOST);
    let dialer = BindingDialer::new(chooser.clone());

    let socket = dialer
        .dial(Network::Udp6, &target.to_string())
        .await
        .unwrap()
        .into_udp()
        .unwrap();
    socket.send(b"hello").await.unwrap();

    let mut buf = [0u8; 16];
    let (len, from) = server.recv_from(&mut buf).await.unwrap();
    assert_eq!(&buf[..len], b"hello");
    assert_eq!(from, socket.local_addr().unwrap());
    assert_eq!(from.ip(), IpAddr::V6(Ipv6Addr::LOCALHOST));
    assert_eq!(chooser.calls(), vec![Ipv6Addr::LOCALHOST]);
}

#[tokio::test]
async fn test_family_mismatch_and_bad_input() {
    let dialer = BindingDialer::new(RecordingChooser::failing());

    assert!(matches!(
        dialer.dial(Network::Tcp6, "127.0.0.1:80").await,
        Err(DialError::NoSuitableAddress { .. })
    ));
    assert!(matches!(
        dialer.dial(Network::Udp4, "[::1]:53").await,
        Err(DialError::NoSuitableAddress { .. })
    ));
    assert!(matches!(
        dialer.dial(Network::Tcp, "missing-port").await,
        Err(DialError::InvalidAddress(_))
    ));
    assert!(matches!(
        dialer.dial_str("sctp", "127.0.0.1:80").await,
        Err(DialError::UnsupportedNetwork(_))
    ));
}

#[tokio::test]
async fn test_hostname_resolved_at_dial_time() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let chooser = RecordingChooser::failing();
    let dialer = BindingDialer::new(chooser.clone());

    let accept = tokio::spawn(async move { listener.accept().await.is_ok() });

    let connection = dialer
        .dial(Network::Tcp4, &format!("localhost:{port}"))
        .await
        .unwrap();
    let peer: SocketAddr = connection.peer_addr().unwrap();
    assert!(peer.ip().is_loopback());
    assert!(accept.await.unwrap());
    assert!(chooser.calls().is_empty());
}
