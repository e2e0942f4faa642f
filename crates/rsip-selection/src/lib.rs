//! # Random Source IP Selection
//!
//! Per-connection IPv6 source address selection. Outbound sockets are bound
//! to an address picked for the destination's egress interface before the
//! kernel connects them.
//!
//! Two strategies:
//!
//! - **Random pick** among the global unicast addresses the egress
//!   interface already carries.
//! - **Rotating pool**: one managed address per interface, `prefix ‖ suffix`
//!   with a suffix shared across the pool. The pool installs it on first
//!   use, keeps its valid lifetime fresh, and replaces every address at
//!   once on rotation.
//!
//! ## Architecture
//!
//! Hexagonal, like the rest of the workspace:
//! - **Domain Layer:** address scope rules, prefix derivation, epochs
//! - **Ports Layer:** chooser/pool APIs in, kernel and randomness out
//! - **Service Layer:** egress resolution, pool, refresher, choosers
//! - **Adapters Layer:** rtnetlink kernel (feature `netlink`), random sources
//! - **Dialer:** binds outbound TCP/UDP sockets to the chooser's pick
//!
//! ## Example
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "netlink", target_os = "linux"))]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use rsip_selection::{
//!     AddressPool, BindingDialer, EgressResolver, NetlinkKernel, OsRandomSource, PoolChooser,
//!     PoolConfig,
//! };
//!
//! let kernel = Arc::new(NetlinkKernel::new());
//! let pool = Arc::new(AddressPool::new(kernel.clone(), Arc::new(OsRandomSource), PoolConfig::default())?);
//! let chooser = PoolChooser::new(EgressResolver::new(kernel), pool.clone());
//! let dialer = BindingDialer::new(Arc::new(chooser));
//!
//! let connection = dialer.dial_str("tcp", "[2001:db8::80]:80").await?;
//! println!("bound to {}", connection.local_addr()?);
//! pool.rotate()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod adapters;
pub mod dialer;
pub mod domain;
pub mod ports;
pub mod service;

/// Test utilities (FakeKernel, ScriptedRandomSource)
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// CORE RE-EXPORTS
// =============================================================================

// Domain
pub use domain::{
    eligible_candidates, is_global_unicast, network_prefix, AddressFlags, AddressSpec, ConfigError,
    Epoch, HostSuffix, InterfaceAddress, InterfaceIndex, KernelError, Lifetimes, NetworkPrefix,
    PoolConfig, PoolError, PoolOperation, PoolStats, RouteEntry, RouteError, SelectionError,
};

// Port traits
pub use ports::{AddressPoolApi, AddressTable, RandomSource, RouteLookup, SourceAddressChooser};

// Services
pub use service::{
    call_blocking, spawn_refresher, AddressPool, EgressResolver, PoolChooser, RandomPickChooser,
    RefresherHandle,
};

// Dialer
pub use dialer::{BindingDialer, Connection, DialError, Network};

// =============================================================================
// ADAPTER RE-EXPORTS
// =============================================================================

pub use adapters::{OsRandomSource, SeededRandomSource};

#[cfg(all(feature = "netlink", target_os = "linux"))]
pub use adapters::NetlinkKernel;
