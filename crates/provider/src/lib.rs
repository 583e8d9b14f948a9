//! # Provider
//!
//! A resource lifecycle manager.
//!
//! Resource types register with a [`Manager`], which creates named instances
//! of them and drives each instance through validate, plan, apply and
//! destroy. Instances may reference each other; the manager keeps the
//! resulting dependency graph acyclic and tears it down in dependency order.
//!
//! ## Core Concepts
//!
//! - **Resource**: a type of thing that can be managed (a listener, a route)
//! - **ResourceInstance**: one named, independently configurable instance
//! - **State**: the attribute map an instance is configured with
//! - **Plan**: the field-level difference between applied and desired state
//! - **DependencyGraph**: `name → references` with cycle checks and orderings
//!
//! ## Example
//!
//! ```ignore
//! use provider::{Context, Manager, State, UpdateResourceInstanceRequest};
//!
//! let manager = Manager::new("demo", "demo provider", "0.1.0");
//! manager.register_resource(ListenerResource::shared())?;
//! manager.new_instance("listener", "listener.main")?;
//!
//! let ctx = Context::background();
//! let response = manager.update_resource_instance(
//!     &ctx,
//!     "listener.main",
//!     &UpdateResourceInstanceRequest {
//!         attributes: State::from([("port", 8080)]),
//!         apply: true,
//!     },
//! )?;
//! println!("{}", response.plan);
//!
//! manager.close(&ctx)?;
//! ```
//!
//! Most resource types implement [`Managed`] on top of an [`InstanceCore`]
//! and get the instance contract for free; [`ResourceInstance`] can also be
//! implemented directly.

pub mod api;
pub mod context;
pub mod decode;
pub mod error;
pub mod graph;
pub mod instance;
pub mod manager;
pub mod plan;
pub mod resource;
pub mod schema;
pub mod state;

#[cfg(test)]
mod fixtures;

// Re-export main types at crate root
pub use api::{
    CreateResourceInstanceRequest, CreateResourceInstanceResponse, DestroyResourceInstanceRequest,
    DestroyResourceInstanceResponse, GetResourceInstanceResponse, InstanceMeta,
    ListResourceInstancesRequest, ListResourceInstancesResponse, ListResourcesRequest,
    ListResourcesResponse, ResourceMeta, UpdateResourceInstanceRequest,
    UpdateResourceInstanceResponse,
};
pub use context::Context;
pub use decode::{Decoder, FromValue, format_duration, parse_duration};
pub use error::{Error, ErrorKind, Result, Stage};
pub use graph::DependencyGraph;
pub use instance::{InstanceCore, Managed};
pub use manager::Manager;
pub use plan::{Action, Change, Plan};
pub use resource::{
    InstanceRef, NoResolver, Observable, ObserverFn, Resolver, Resource, ResourceInstance,
    ValidatedConfig,
};
pub use schema::{Attribute, AttributeKind};
pub use state::{Encoder, State, StateOf, WritableStateOf};
