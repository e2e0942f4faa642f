//! # Selection Services
//!
//! Wires the domain logic to the kernel ports:
//!
//! - `egress` - route lookup to a single output interface
//! - `pool` - rotating managed address pool
//! - `refresher` - background lifetime refresh task
//! - `chooser` - the two `SourceAddressChooser` strategies

mod chooser;
mod egress;
mod pool;
mod refresher;

pub use chooser::{PoolChooser, RandomPickChooser};
pub use egress::EgressResolver;
pub use pool::AddressPool;
pub use refresher::{call_blocking, spawn_refresher, RefresherHandle};
