//! Resource types the CLI registers
//!
//! A `listener` is a socket address; a `route` serves a path prefix on a
//! listener and may be ordered after other routes. Neither opens sockets:
//! they exist to drive the lifecycle manager with a realistic dependency
//! graph.

pub mod listener;
pub mod route;

use provider::{Manager, Resource};
use std::sync::Arc;

pub use listener::ListenerResource;
pub use route::RouteResource;

/// Every built-in resource type
pub fn builtin() -> Vec<Arc<dyn Resource>> {
    vec![ListenerResource::shared(), RouteResource::shared()]
}

/// Register every built-in resource type with `manager`
pub fn register_all(manager: &Manager) -> provider::Result<()> {
    for resource in builtin() {
        manager.register_resource(resource)?;
    }
    Ok(())
}
