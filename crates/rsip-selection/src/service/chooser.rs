//! # Source Address Choosers
//!
//! Two strategies behind [`SourceAddressChooser`]:
//!
//! - [`RandomPickChooser`] picks among the addresses the egress interface
//!   already has. Stateless apart from the random source.
//! - [`PoolChooser`] hands out the current managed address of the egress
//!   interface from the rotating [`AddressPoolApi`].

use std::net::Ipv6Addr;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{eligible_candidates, pick_index, SelectionError};
use crate::ports::inbound::{AddressPoolApi, SourceAddressChooser};
use crate::ports::outbound::{AddressTable, RandomSource};

use super::egress::EgressResolver;

/// Uniform pick among the egress interface's global unicast addresses.
pub struct RandomPickChooser {
    egress: EgressResolver,
    addresses: Arc<dyn AddressTable>,
    random: Arc<dyn RandomSource>,
}

impl RandomPickChooser {
    pub fn new(
        egress: EgressResolver,
        addresses: Arc<dyn AddressTable>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            egress,
            addresses,
            random,
        }
    }
}

impl SourceAddressChooser for RandomPickChooser {
    fn choose(&self, destination: Ipv6Addr) -> Result<Ipv6Addr, SelectionError> {
        let interface = self.egress.resolve(destination)?;
        let addresses = self
            .addresses
            .list_ipv6(interface)
            .map_err(|source| SelectionError::Lookup { interface, source })?;

        let candidates = eligible_candidates(&addresses);
        if candidates.is_empty() {
            return Err(SelectionError::NoCandidates(interface));
        }

        let chosen = candidates[pick_index(self.random.next_u64(), candidates.len())];
        debug!(%destination, %interface, source = %chosen, candidates = candidates.len(), "picked source address");
        Ok(chosen)
    }
}

/// Current managed address of the egress interface.
pub struct PoolChooser {
    egress: EgressResolver,
    pool: Arc<dyn AddressPoolApi>,
}

impl PoolChooser {
    pub fn new(egress: EgressResolver, pool: Arc<dyn AddressPoolApi>) -> Self {
        Self { egress, pool }
    }
}

impl SourceAddressChooser for PoolChooser {
    fn choose(&self, destination: Ipv6Addr) -> Result<Ipv6Addr, SelectionError> {
        let interface = self.egress.resolve(destination)?;
        let chosen = self.pool.get_source_address(interface)?;
        debug!(%destination, %interface, source = %chosen, "using pool address");
        Ok(chosen)
    }
}
