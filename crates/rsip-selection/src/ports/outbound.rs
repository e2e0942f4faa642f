//! # Driven Ports (Outbound SPI)
//!
//! Capabilities the selection services require from the host. The Linux
//! implementation lives in `adapters::netlink`; tests use the in-memory
//! `test_utils::FakeKernel`.

use std::net::Ipv6Addr;

use crate::domain::{AddressSpec, InterfaceAddress, InterfaceIndex, KernelError, RouteEntry};

/// Kernel routing-table lookup.
///
/// # Thread Safety
///
/// Called concurrently from every in-flight dial.
pub trait RouteLookup: Send + Sync {
    /// Ask the kernel which routes it would use for `destination`.
    ///
    /// Returns every route in the reply. Interpreting the count is left to
    /// the caller.
    fn routes_to(&self, destination: Ipv6Addr) -> Result<Vec<RouteEntry>, KernelError>;
}

/// Interface address configuration.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. The pool serializes its own
/// mutations, but the random-pick chooser lists addresses concurrently.
pub trait AddressTable: Send + Sync {
    /// Name of the interface, for logs.
    fn link_name(&self, interface: InterfaceIndex) -> Result<String, KernelError>;

    /// IPv6 addresses configured on the interface, in kernel order.
    fn list_ipv6(&self, interface: InterfaceIndex) -> Result<Vec<InterfaceAddress>, KernelError>;

    /// Install a new address. Fails with [`KernelError::AddressExists`] if
    /// it is already configured.
    fn add(&self, spec: &AddressSpec) -> Result<(), KernelError>;

    /// Install or update an address in place (lifetimes included).
    fn replace(&self, spec: &AddressSpec) -> Result<(), KernelError>;

    /// Remove an address. Fails with [`KernelError::AddressNotFound`] if it
    /// is no longer configured.
    fn delete(&self, spec: &AddressSpec) -> Result<(), KernelError>;
}

/// Source of random 64-bit draws.
///
/// Shared by every caller; implementations guard their own state.
pub trait RandomSource: Send + Sync {
    /// Next uniformly distributed value.
    fn next_u64(&self) -> u64;
}
