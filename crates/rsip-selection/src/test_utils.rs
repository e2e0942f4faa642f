//! Test utilities for source address selection.
//!
//! In-memory stand-ins for the kernel and for randomness, so the pool and
//! the choosers can be driven deterministically on any platform.
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use rsip_selection::test_utils::FakeKernel;
//! use rsip_selection::{AddressTable, InterfaceIndex};
//!
//! let eth0 = InterfaceIndex::new(2);
//! let kernel = FakeKernel::new().with_link(eth0, "eth0", &["2001:db8::1/64"]);
//! assert_eq!(kernel.list_ipv6(eth0).unwrap().len(), 1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::net::Ipv6Addr;

use parking_lot::Mutex;

use crate::domain::{
    AddressFlags, AddressSpec, InterfaceAddress, InterfaceIndex, KernelError, RouteEntry,
};
use crate::ports::outbound::{AddressTable, RandomSource, RouteLookup};

/// Kernel operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    List,
    Add,
    Replace,
    Delete,
    Route,
}

#[derive(Debug, Default)]
struct FakeState {
    links: HashMap<InterfaceIndex, String>,
    addresses: HashMap<InterfaceIndex, Vec<InterfaceAddress>>,
    routes: HashMap<Ipv6Addr, Vec<RouteEntry>>,
    default_routes: Vec<RouteEntry>,
    failing: Vec<FakeOp>,
    adds: u64,
    deletes: u64,
    replaces: HashMap<Ipv6Addr, u64>,
    installed: Vec<AddressSpec>,
    name_lookups: u64,
}

impl FakeState {
    fn check(&self, op: FakeOp) -> Result<(), KernelError> {
        if self.failing.contains(&op) {
            return Err(KernelError::Netlink {
                operation: "fake",
                source: std::io::Error::other(format!("injected {op:?} failure")),
            });
        }
        Ok(())
    }

    fn link_addresses(
        &mut self,
        interface: InterfaceIndex,
    ) -> Result<&mut Vec<InterfaceAddress>, KernelError> {
        if !self.links.contains_key(&interface) {
            return Err(KernelError::NoSuchInterface(interface));
        }
        Ok(self.addresses.entry(interface).or_default())
    }
}

/// In-memory kernel implementing both [`RouteLookup`] and [`AddressTable`].
///
/// Routes default to every destination leaving through the first link
/// added, unless set explicitly.
#[derive(Debug, Default)]
pub struct FakeKernel {
    state: Mutex<FakeState>,
}

impl FakeKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a link with addresses in `addr/len` notation.
    ///
    /// # Panics
    ///
    /// On malformed address strings.
    #[must_use]
    pub fn with_link(self, interface: InterfaceIndex, name: &str, addresses: &[&str]) -> Self {
        {
            let mut state = self.state.lock();
            state.links.insert(interface, name.to_string());
            let parsed = addresses.iter().map(|a| parse_cidr(a)).collect();
            state.addresses.insert(interface, parsed);
            if state.default_routes.is_empty() {
                state.default_routes = vec![RouteEntry::via(interface)];
            }
        }
        self
    }

    /// Routes returned for destinations without an explicit entry.
    pub fn set_default_routes(&self, routes: Vec<RouteEntry>) {
        self.state.lock().default_routes = routes;
    }

    /// Routes returned for one destination.
    pub fn set_routes(&self, destination: Ipv6Addr, routes: Vec<RouteEntry>) {
        self.state.lock().routes.insert(destination, routes);
    }

    /// Configure an address behind the pool's back.
    pub fn insert_address(&self, interface: InterfaceIndex, address: InterfaceAddress) {
        self.state
            .lock()
            .addresses
            .entry(interface)
            .or_default()
            .push(address);
    }

    /// Drop an address behind the pool's back, as lifetime expiry would.
    pub fn expire_address(&self, interface: InterfaceIndex, address: Ipv6Addr) {
        if let Some(list) = self.state.lock().addresses.get_mut(&interface) {
            list.retain(|a| a.address != address);
        }
    }

    /// Make every later call of `op` fail until [`Self::heal`].
    pub fn fail(&self, op: FakeOp) {
        self.state.lock().failing.push(op);
    }

    pub fn heal(&self) {
        self.state.lock().failing.clear();
    }

    pub fn addresses(&self, interface: InterfaceIndex) -> Vec<InterfaceAddress> {
        self.state
            .lock()
            .addresses
            .get(&interface)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_address(&self, interface: InterfaceIndex, address: Ipv6Addr) -> bool {
        self.addresses(interface).iter().any(|a| a.address == address)
    }

    pub fn add_count(&self) -> u64 {
        self.state.lock().adds
    }

    pub fn delete_count(&self) -> u64 {
        self.state.lock().deletes
    }

    /// Number of replaces issued for `address`.
    pub fn replace_count(&self, address: Ipv6Addr) -> u64 {
        self.state
            .lock()
            .replaces
            .get(&address)
            .copied()
            .unwrap_or(0)
    }

    /// Number of `link_name` calls so far.
    pub fn name_lookups(&self) -> u64 {
        self.state.lock().name_lookups
    }

    /// Every spec passed to `add` or `replace`, in order.
    pub fn installed(&self) -> Vec<AddressSpec> {
        self.state.lock().installed.clone()
    }
}

impl RouteLookup for FakeKernel {
    fn routes_to(&self, destination: Ipv6Addr) -> Result<Vec<RouteEntry>, KernelError> {
        let state = self.state.lock();
        state.check(FakeOp::Route)?;
        Ok(state
            .routes
            .get(&destination)
            .cloned()
            .unwrap_or_else(|| state.default_routes.clone()))
    }
}

impl AddressTable for FakeKernel {
    fn link_name(&self, interface: InterfaceIndex) -> Result<String, KernelError> {
        let mut state = self.state.lock();
        state.name_lookups += 1;
        state
            .links
            .get(&interface)
            .cloned()
            .ok_or(KernelError::NoSuchInterface(interface))
    }

    fn list_ipv6(&self, interface: InterfaceIndex) -> Result<Vec<InterfaceAddress>, KernelError> {
        let mut state = self.state.lock();
        state.check(FakeOp::List)?;
        Ok(state.link_addresses(interface)?.clone())
    }

    fn add(&self, spec: &AddressSpec) -> Result<(), KernelError> {
        let mut state = self.state.lock();
        state.check(FakeOp::Add)?;
        let list = state.link_addresses(spec.interface)?;
        if list.iter().any(|a| a.address == spec.address) {
            return Err(KernelError::AddressExists(spec.address));
        }
        list.push(observed(spec));
        state.adds += 1;
        state.installed.push(*spec);
        Ok(())
    }

    fn replace(&self, spec: &AddressSpec) -> Result<(), KernelError> {
        let mut state = self.state.lock();
        state.check(FakeOp::Replace)?;
        let list = state.link_addresses(spec.interface)?;
        list.retain(|a| a.address != spec.address);
        list.push(observed(spec));
        *state.replaces.entry(spec.address).or_default() += 1;
        state.installed.push(*spec);
        Ok(())
    }

    fn delete(&self, spec: &AddressSpec) -> Result<(), KernelError> {
        let mut state = self.state.lock();
        state.check(FakeOp::Delete)?;
        let list = state.link_addresses(spec.interface)?;
        let before = list.len();
        list.retain(|a| a.address != spec.address);
        if list.len() == before {
            return Err(KernelError::AddressNotFound(spec.address));
        }
        state.deletes += 1;
        Ok(())
    }
}

fn observed(spec: &AddressSpec) -> InterfaceAddress {
    let mut flags = AddressFlags::default();
    if spec.no_dad {
        flags = flags.with(AddressFlags::NODAD);
    }
    InterfaceAddress::new(spec.address, spec.prefix_len).with_flags(flags)
}

fn parse_cidr(text: &str) -> InterfaceAddress {
    let (address, len) = text.split_once('/').unwrap_or((text, "128"));
    InterfaceAddress::new(
        address.parse().expect("valid IPv6 address"),
        len.parse().expect("valid prefix length"),
    )
}

/// Random source replaying a fixed script.
///
/// Once the script is exhausted it keeps counting upward from the last
/// value, so draws never repeat.
#[derive(Debug)]
pub struct ScriptedRandomSource {
    inner: Mutex<(VecDeque<u64>, u64)>,
}

impl ScriptedRandomSource {
    pub fn new(values: impl IntoIterator<Item = u64>) -> Self {
        Self {
            inner: Mutex::new((values.into_iter().collect(), 0)),
        }
    }
}

impl RandomSource for ScriptedRandomSource {
    fn next_u64(&self) -> u64 {
        let mut inner = self.inner.lock();
        let (script, last) = &mut *inner;
        let value = script.pop_front().unwrap_or_else(|| last.wrapping_add(1));
        *last = value;
        value
    }
}
