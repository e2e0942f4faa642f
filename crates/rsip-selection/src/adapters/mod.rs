//! # Adapters Layer
//!
//! Concrete implementations of the outbound ports.
//!
//! - `random` - OS and seeded random sources (always available)
//! - `netlink` - rtnetlink kernel adapter (feature `netlink`, Linux only)

mod random;

#[cfg(all(feature = "netlink", target_os = "linux"))]
mod netlink;

pub use random::{OsRandomSource, SeededRandomSource};

#[cfg(all(feature = "netlink", target_os = "linux"))]
pub use netlink::NetlinkKernel;
