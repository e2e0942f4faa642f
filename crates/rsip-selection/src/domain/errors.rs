//! Error taxonomy for route resolution, pool management and selection.

use std::fmt;
use std::net::Ipv6Addr;

use thiserror::Error;

use super::types::InterfaceIndex;

/// Failures reported by the kernel capability ports.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("netlink {operation} failed: {source}")]
    Netlink {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("no such interface: {0}")]
    NoSuchInterface(InterfaceIndex),

    #[error("address {0} is not configured")]
    AddressNotFound(Ipv6Addr),

    #[error("address {0} is already configured")]
    AddressExists(Ipv6Addr),

    #[error("malformed netlink reply: {0}")]
    Malformed(&'static str),
}

/// Egress interface resolution failures. Never retried.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no route to {0}")]
    NoRoute(Ipv6Addr),

    #[error("route lookup for {destination} returned {count} routes")]
    AmbiguousRoute { destination: Ipv6Addr, count: usize },

    #[error("route to {0} has no output interface")]
    NoEgressInterface(Ipv6Addr),

    #[error("route lookup for {destination} failed: {source}")]
    Lookup {
        destination: Ipv6Addr,
        #[source]
        source: KernelError,
    },
}

/// Pool mutation that was in progress when the kernel failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOperation {
    Remove,
    Refresh,
}

impl fmt::Display for PoolOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remove => write!(f, "remove"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// Address pool failures.
///
/// Per-call errors leave the pool usable. [`PoolError::is_fatal`] marks the
/// ones after which the tracked-address list no longer matches the kernel.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("listing addresses on {interface} failed: {source}")]
    Lookup {
        interface: InterfaceIndex,
        #[source]
        source: KernelError,
    },

    #[error("unexpected prefix length /{prefix_len} for {address} on {interface} (expected /64)")]
    PrefixShape {
        interface: InterfaceIndex,
        address: Ipv6Addr,
        prefix_len: u8,
    },

    #[error("no global unicast /64 prefix on {0}")]
    NoPrefix(InterfaceIndex),

    #[error("{interface} carries {count} distinct /64 prefixes")]
    MultiplePrefixes { interface: InterfaceIndex, count: usize },

    #[error("installing {address} failed: {source}")]
    Install {
        address: Ipv6Addr,
        #[source]
        source: KernelError,
    },

    #[error("{operation} of managed address {address} failed: {source}")]
    InvariantBroken {
        operation: PoolOperation,
        address: Ipv6Addr,
        #[source]
        source: KernelError,
    },

    #[error("address pool is poisoned after an earlier kernel failure")]
    Poisoned,

    #[error("address pool is closed")]
    Closed,
}

impl PoolError {
    /// True when the pool can no longer be trusted and the process should stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantBroken { .. } | Self::Poisoned)
    }
}

/// Source address selection failures, surfaced per connection attempt.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("listing addresses on {interface} failed: {source}")]
    Lookup {
        interface: InterfaceIndex,
        #[source]
        source: KernelError,
    },

    #[error("no eligible global unicast address on {0}")]
    NoCandidates(InterfaceIndex),

    #[error("selection task failed: {0}")]
    Aborted(String),
}

/// Pool configuration rejected by [`super::PoolConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("valid lifetime must be non-zero")]
    ZeroValidLifetime,

    #[error("preferred lifetime ({preferred}s) exceeds valid lifetime ({valid}s)")]
    PreferredExceedsValid { preferred: u64, valid: u64 },

    #[error("refresh interval must be non-zero")]
    ZeroRefreshInterval,

    #[error("refresh interval ({refresh}s) must be shorter than the valid lifetime ({valid}s)")]
    RefreshTooSlow { refresh: u64, valid: u64 },
}
