//! Egress interface resolution through the kernel routing table.

use std::net::Ipv6Addr;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{InterfaceIndex, RouteError};
use crate::ports::outbound::RouteLookup;

/// Resolves the interface the kernel would send a packet for a destination on.
#[derive(Clone)]
pub struct EgressResolver {
    routes: Arc<dyn RouteLookup>,
}

impl EgressResolver {
    pub fn new(routes: Arc<dyn RouteLookup>) -> Self {
        Self { routes }
    }

    /// Exactly one route with an output interface must come back.
    pub fn resolve(&self, destination: Ipv6Addr) -> Result<InterfaceIndex, RouteError> {
        let routes = self
            .routes
            .routes_to(destination)
            .map_err(|source| RouteError::Lookup {
                destination,
                source,
            })?;

        match routes.as_slice() {
            [] => Err(RouteError::NoRoute(destination)),
            [route] => {
                let interface = route
                    .interface
                    .ok_or(RouteError::NoEgressInterface(destination))?;
                debug!(%destination, %interface, "resolved egress interface");
                Ok(interface)
            }
            many => Err(RouteError::AmbiguousRoute {
                destination,
                count: many.len(),
            }),
        }
    }
}
