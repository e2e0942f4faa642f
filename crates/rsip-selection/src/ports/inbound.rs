//! # Driving Ports (Inbound API)
//!
//! The APIs this crate exposes to the dialer and to the operator layer.

use std::net::Ipv6Addr;

use crate::domain::{Epoch, InterfaceIndex, PoolError, PoolStats, SelectionError};

/// Strategy returning the local address to bind for a destination.
///
/// Implementations are reentrant: many dials call `choose` at once. The
/// call may block on kernel I/O, so async callers run it on the blocking
/// pool.
pub trait SourceAddressChooser: Send + Sync {
    /// Pick the source address for a connection to `destination`.
    fn choose(&self, destination: Ipv6Addr) -> Result<Ipv6Addr, SelectionError>;
}

/// Operations of the rotating address pool.
///
/// Every method runs under the pool's single lock, so a rotation is never
/// observed half-done by a concurrent `get_source_address`.
pub trait AddressPoolApi: Send + Sync {
    /// Managed address of the current epoch on `interface`, installing it
    /// on first use.
    fn get_source_address(&self, interface: InterfaceIndex) -> Result<Ipv6Addr, PoolError>;

    /// Remove every tracked address and start a new epoch.
    fn rotate(&self) -> Result<Epoch, PoolError>;

    /// Re-issue every tracked address with a fresh valid lifetime.
    fn refresh(&self) -> Result<usize, PoolError>;

    /// Remove every tracked address without starting a new epoch.
    fn drain(&self) -> Result<usize, PoolError>;

    /// Bookkeeping snapshot.
    fn stats(&self) -> PoolStats;
}
