//! Domain Layer - pure address logic with no I/O
//!
//! - Interface, address, prefix and epoch value types
//! - Prefix derivation and candidate filtering
//! - Pool configuration
//! - Error taxonomy shared by every layer

pub mod config;
pub mod errors;
pub mod services;
pub mod types;

pub use config::*;
pub use errors::*;
pub use services::*;
pub use types::*;
