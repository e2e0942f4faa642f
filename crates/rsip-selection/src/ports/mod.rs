//! # Ports Layer - Hexagonal Architecture Boundaries
//!
//! - **Driving Ports (Inbound):** what the dialer and the operator layer call
//! - **Driven Ports (Outbound):** kernel and randomness capabilities the
//!   services require from adapters

pub mod inbound;
pub mod outbound;

pub use inbound::{AddressPoolApi, SourceAddressChooser};
pub use outbound::{AddressTable, RandomSource, RouteLookup};
