//! # Address Pool
//!
//! Owns the managed addresses installed on egress interfaces.
//!
//! ## Epochs
//!
//! Every managed address is `prefix ‖ suffix` where the suffix is shared by
//! the whole pool within one epoch. A rotation removes everything tracked
//! and draws a new suffix, so the next connection on any interface leaves
//! from an address never used before.
//!
//! ## Locking
//!
//! One coarse mutex serializes get, rotate, refresh and drain. Kernel calls
//! are made while holding it: listing happens under the lock so two
//! concurrent gets cannot both decide to install the same address.
//! Interface names for log fields come from a separate cache filled before
//! the state lock is taken.
//!
//! ## Shutdown
//!
//! [`AddressPool::drain`] closes the pool. Later gets, rotations and
//! refreshes fail with [`PoolError::Closed`] so nothing is installed after
//! the final cleanup.

use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::{
    network_prefix, AddressSpec, ConfigError, Epoch, HostSuffix, InterfaceIndex, KernelError,
    NetworkPrefix, PoolConfig, PoolError, PoolOperation, PoolStats,
};
use crate::ports::inbound::AddressPoolApi;
use crate::ports::outbound::{AddressTable, RandomSource};

/// Redraws allowed when a suffix collides with the previous epoch's.
const MAX_SUFFIX_DRAWS: usize = 8;

#[derive(Debug, Default)]
struct PoolState {
    epoch: Option<Epoch>,
    /// Addresses installed in the current epoch, one per interface.
    tracked: Vec<AddressSpec>,
    poisoned: bool,
    /// Set by drain; the pool accepts no further work.
    closed: bool,
    installs: u64,
    removals: u64,
    refreshes: u64,
}

impl PoolState {
    fn ensure_usable(&self) -> Result<(), PoolError> {
        if self.poisoned {
            return Err(PoolError::Poisoned);
        }
        if self.closed {
            return Err(PoolError::Closed);
        }
        Ok(())
    }
}

/// Rotating pool of managed IPv6 source addresses.
pub struct AddressPool {
    kernel: Arc<dyn AddressTable>,
    random: Arc<dyn RandomSource>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    names: Mutex<HashMap<InterfaceIndex, String>>,
}

impl AddressPool {
    /// Create an empty pool. No epoch exists until the first get or rotate.
    pub fn new(
        kernel: Arc<dyn AddressTable>,
        random: Arc<dyn RandomSource>,
        config: PoolConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            kernel,
            random,
            config,
            state: Mutex::new(PoolState::default()),
            names: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Managed address of the current epoch on `interface`.
    ///
    /// Installs it (preferred lifetime 0, DAD disabled) the first time it is
    /// asked for. An address already present on the interface is returned
    /// without a second install.
    pub fn get_source_address(&self, interface: InterfaceIndex) -> Result<Ipv6Addr, PoolError> {
        self.learn_link_name(interface);
        let mut state = self.state.lock();
        state.ensure_usable()?;

        let addresses = self
            .kernel
            .list_ipv6(interface)
            .map_err(|source| PoolError::Lookup { interface, source })?;
        let prefix = network_prefix(interface, &addresses)?;
        let epoch = self.current_epoch(&mut state);
        let candidate = prefix.with_suffix(epoch.suffix);

        if addresses.iter().any(|a| a.address == candidate) {
            debug!(%interface, address = %candidate, epoch = epoch.number, "reusing managed address");
            return Ok(candidate);
        }

        let spec = self.spec_for(interface, candidate);
        self.kernel
            .add(&spec)
            .map_err(|source| PoolError::Install {
                address: candidate,
                source,
            })?;
        state.tracked.push(spec);
        state.installs += 1;

        info!(
            link = %self.link_label(interface),
            address = %candidate,
            epoch = epoch.number,
            valid_lft = spec.lifetimes.valid.as_secs(),
            "installed managed address"
        );
        Ok(candidate)
    }

    /// Remove every tracked address and move to a new epoch.
    ///
    /// The first call on a fresh pool establishes epoch 0. A removal the
    /// kernel reports as already gone counts as removed; any other removal
    /// failure poisons the pool.
    pub fn rotate(&self) -> Result<Epoch, PoolError> {
        let mut state = self.state.lock();
        state.ensure_usable()?;

        let removed = self.remove_tracked(&mut state)?;
        let epoch = match state.epoch {
            None => Epoch::initial(self.draw_suffix(None)),
            Some(previous) => previous.next(self.draw_suffix(Some(previous.suffix))),
        };
        state.epoch = Some(epoch);

        info!(epoch = epoch.number, removed, "rotated address pool");
        Ok(epoch)
    }

    /// Re-issue every tracked address with a fresh valid lifetime.
    ///
    /// Membership never changes. Returns the number of addresses refreshed.
    pub fn refresh(&self) -> Result<usize, PoolError> {
        let mut state = self.state.lock();
        state.ensure_usable()?;

        let lifetimes = self.config.lifetimes();
        for index in 0..state.tracked.len() {
            state.tracked[index].lifetimes = lifetimes;
            let spec = state.tracked[index];
            if let Err(source) = self.kernel.replace(&spec) {
                state.poisoned = true;
                error!(address = %spec.address, interface = %spec.interface, %source, "refresh failed, pool poisoned");
                return Err(PoolError::InvariantBroken {
                    operation: PoolOperation::Refresh,
                    address: spec.address,
                    source,
                });
            }
        }

        let refreshed = state.tracked.len();
        state.refreshes += refreshed as u64;
        debug!(refreshed, "refreshed managed addresses");
        Ok(refreshed)
    }

    /// Remove every tracked address without starting a new epoch and close
    /// the pool.
    ///
    /// Meant for shutdown, so it also runs on a poisoned pool and removes
    /// whatever is still tracked. Draining a closed pool again is allowed.
    pub fn drain(&self) -> Result<usize, PoolError> {
        let mut state = self.state.lock();
        state.closed = true;
        if state.poisoned {
            warn!(
                tracked = state.tracked.len(),
                "draining poisoned pool"
            );
        }
        let removed = self.remove_tracked(&mut state)?;
        info!(removed, "drained address pool");
        Ok(removed)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            epoch: state.epoch,
            tracked: state.tracked.len(),
            installs: state.installs,
            removals: state.removals,
            refreshes: state.refreshes,
            poisoned: state.poisoned,
            closed: state.closed,
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    // Caller holds the state lock.
    fn current_epoch(&self, state: &mut PoolState) -> Epoch {
        match state.epoch {
            Some(epoch) => epoch,
            None => {
                let epoch = Epoch::initial(self.draw_suffix(None));
                info!(epoch = epoch.number, "established initial epoch");
                state.epoch = Some(epoch);
                epoch
            }
        }
    }

    /// Delete tracked addresses in order. On failure the failed record and
    /// everything after it stay tracked and the pool is poisoned.
    fn remove_tracked(&self, state: &mut PoolState) -> Result<usize, PoolError> {
        let mut pending = std::mem::take(&mut state.tracked).into_iter();
        let mut removed = 0;

        while let Some(spec) = pending.next() {
            match self.kernel.delete(&spec) {
                Ok(()) => {
                    removed += 1;
                    state.removals += 1;
                    info!(
                        link = %self.link_label(spec.interface),
                        address = %spec.address,
                        "removed managed address"
                    );
                }
                Err(KernelError::AddressNotFound(_)) => {
                    removed += 1;
                    debug!(address = %spec.address, "managed address already gone");
                }
                Err(source) => {
                    state.tracked.push(spec);
                    state.tracked.extend(pending);
                    state.poisoned = true;
                    error!(address = %spec.address, interface = %spec.interface, %source, "removal failed, pool poisoned");
                    return Err(PoolError::InvariantBroken {
                        operation: PoolOperation::Remove,
                        address: spec.address,
                        source,
                    });
                }
            }
        }
        Ok(removed)
    }

    /// Draw a non-zero suffix distinct from `avoid`.
    fn draw_suffix(&self, avoid: Option<HostSuffix>) -> HostSuffix {
        let mut suffix = HostSuffix::from_u64(self.random.next_u64());
        for _ in 1..MAX_SUFFIX_DRAWS {
            if suffix != HostSuffix::ZERO && Some(suffix) != avoid {
                break;
            }
            suffix = HostSuffix::from_u64(self.random.next_u64());
        }
        suffix
    }

    fn spec_for(&self, interface: InterfaceIndex, address: Ipv6Addr) -> AddressSpec {
        AddressSpec {
            interface,
            address,
            prefix_len: NetworkPrefix::LEN,
            lifetimes: self.config.lifetimes(),
            no_dad: true,
        }
    }

    /// Cache the interface name on first sight. Runs without the state lock.
    fn learn_link_name(&self, interface: InterfaceIndex) {
        if self.names.lock().contains_key(&interface) {
            return;
        }
        match self.kernel.link_name(interface) {
            Ok(name) => {
                self.names.lock().insert(interface, name);
            }
            Err(e) => debug!(%interface, error = %e, "interface name unavailable"),
        }
    }

    /// Cached name, or the index when the name was never learned.
    fn link_label(&self, interface: InterfaceIndex) -> String {
        self.names
            .lock()
            .get(&interface)
            .cloned()
            .unwrap_or_else(|| interface.to_string())
    }
}

impl AddressPoolApi for AddressPool {
    fn get_source_address(&self, interface: InterfaceIndex) -> Result<Ipv6Addr, PoolError> {
        AddressPool::get_source_address(self, interface)
    }

    fn rotate(&self) -> Result<Epoch, PoolError> {
        AddressPool::rotate(self)
    }

    fn refresh(&self) -> Result<usize, PoolError> {
        AddressPool::refresh(self)
    }

    fn drain(&self) -> Result<usize, PoolError> {
        AddressPool::drain(self)
    }

    fn stats(&self) -> PoolStats {
        AddressPool::stats(self)
    }
}
