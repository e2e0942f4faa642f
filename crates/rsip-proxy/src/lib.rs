//! # rsip-proxy
//!
//! SOCKS5 proxy on top of `rsip-selection`. Each outbound connection is
//! bound to a source IPv6 address chosen for its destination.
//!
//! ## Modes
//!
//! - `rotating` (default): one managed address per egress interface, kept
//!   alive by the refresher. A newline on stdin, or the optional timer,
//!   rotates every managed address at once.
//! - `random`: a random pick among the addresses the egress interface
//!   already carries. Nothing is installed.
//!
//! ## Modules
//!
//! - `config/` - TOML settings and command line overrides
//! - `socks/` - SOCKS5 CONNECT front end
//! - `rotation/` - stdin and timer rotation triggers
//! - `supervisor/` - refresher and triggers lifecycle, drain on exit

pub mod config;
pub mod rotation;
pub mod socks;
pub mod supervisor;

pub use config::{ConfigError, Mode, ProxyConfig};
pub use socks::SocksServer;
pub use supervisor::Supervisor;
