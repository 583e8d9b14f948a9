//! Resource type and instance contracts
//!
//! A [`Resource`] describes a kind of managed object: its name, its attribute
//! schema, and a factory for instances. A [`ResourceInstance`] is one named
//! object of that kind, driven by the [`Manager`](crate::Manager) through
//! Validate → Plan → Apply → Destroy.
//!
//! Most resource types do not implement [`ResourceInstance`] by hand; they
//! wrap an [`InstanceCore`](crate::InstanceCore) and implement
//! [`Managed`](crate::Managed), which supplies the lifecycle defaults.
//!
//! # Example
//!
//! ```ignore
//! use provider::{Attribute, AttributeKind, Resource, ResourceInstance, Result};
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Listener;
//!
//! impl Resource for Listener {
//!     fn name(&self) -> &str {
//!         "listener"
//!     }
//!
//!     fn schema(&self) -> Vec<Attribute> {
//!         vec![Attribute::new("address", AttributeKind::String).required()]
//!     }
//!
//!     fn new_instance(self: Arc<Self>, name: &str) -> Result<Arc<dyn ResourceInstance>> {
//!         Ok(Arc::new(ListenerInstance::new(name, self)))
//!     }
//! }
//! ```

use crate::context::Context;
use crate::error::{Error, Result};
use crate::plan::Plan;
use crate::schema::Attribute;
use crate::state::State;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A kind of managed object
pub trait Resource: Send + Sync + fmt::Debug {
    /// Unique type name, e.g. `"listener"`
    fn name(&self) -> &str;

    /// Attributes accepted by instances of this type
    fn schema(&self) -> Vec<Attribute>;

    /// Construct a fresh, unapplied instance.
    ///
    /// The returned instance must report exactly `name` from
    /// [`ResourceInstance::name`].
    fn new_instance(self: Arc<Self>, name: &str) -> Result<Arc<dyn ResourceInstance>>;
}

/// One named, managed object
pub trait ResourceInstance: Send + Sync + fmt::Debug {
    /// Globally unique instance name
    fn name(&self) -> &str;

    /// The type this instance was created from
    fn resource(&self) -> Arc<dyn Resource>;

    /// Decode and check a desired state, resolving references through `resolver`.
    fn validate(&self, ctx: &Context, state: &State, resolver: &dyn Resolver)
    -> Result<ValidatedConfig>;

    /// Compare a validated configuration against the applied one.
    fn plan(&self, ctx: &Context, config: &ValidatedConfig) -> Result<Plan>;

    /// Make `config` the applied configuration.
    fn apply(&self, ctx: &Context, config: ValidatedConfig) -> Result<()>;

    /// Release whatever the instance holds.
    fn destroy(&self, ctx: &Context) -> Result<()>;

    /// External form of the applied configuration, `None` before the first apply.
    fn read(&self, ctx: &Context) -> Result<Option<State>>;

    /// Names of the instances the applied configuration depends on
    fn references(&self) -> Vec<String>;

    /// Observer registry, when the instance supports one
    fn observable(&self) -> Option<&dyn Observable> {
        None
    }

    /// An instance that depends on this one was applied.
    fn on_state_change(&self, _source: &dyn ResourceInstance) {}

    /// An instance that depended on this one is going away.
    fn on_state_remove(&self, _source: &dyn ResourceInstance) {}

    fn as_any(&self) -> &dyn Any;
}

/// Callback invoked with the instance whose state changed
pub type ObserverFn = Arc<dyn Fn(&dyn ResourceInstance) + Send + Sync>;

/// Keyed observer registration.
///
/// Registering under an existing id replaces the previous callback.
pub trait Observable {
    fn add_observer(&self, id: &str, observer: ObserverFn);
    fn remove_observer(&self, id: &str);
}

/// Name → live instance lookup used while validating references
pub trait Resolver {
    fn resolve(&self, name: &str) -> Option<Arc<dyn ResourceInstance>>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> Option<Arc<dyn ResourceInstance>>,
{
    fn resolve(&self, name: &str) -> Option<Arc<dyn ResourceInstance>> {
        self(name)
    }
}

/// Resolver that knows no instances
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl Resolver for NoResolver {
    fn resolve(&self, _name: &str) -> Option<Arc<dyn ResourceInstance>> {
        None
    }
}

/// A resolved reference to another instance, held inside a configuration
#[derive(Clone)]
pub struct InstanceRef(Arc<dyn ResourceInstance>);

impl InstanceRef {
    pub fn new(instance: Arc<dyn ResourceInstance>) -> Self {
        Self(instance)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn instance(&self) -> &Arc<dyn ResourceInstance> {
        &self.0
    }

    /// Borrow the referenced instance as its concrete type
    pub fn downcast<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InstanceRef").field(&self.name()).finish()
    }
}

// References compare by name; two configs pointing at the same instance are equal
impl PartialEq for InstanceRef {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for InstanceRef {}

/// Output of [`ResourceInstance::validate`]: a type-erased configuration and
/// the instance names it would reference once applied.
pub struct ValidatedConfig {
    config: Box<dyn Any + Send + Sync>,
    references: Vec<String>,
}

impl ValidatedConfig {
    pub fn new<C: Any + Send + Sync>(config: C, references: Vec<String>) -> Self {
        Self {
            config: Box::new(config),
            references,
        }
    }

    /// Proposed dependency edges
    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn downcast_ref<C: Any>(&self) -> Result<&C> {
        self.config
            .downcast_ref::<C>()
            .ok_or_else(|| Error::internal("unexpected config type"))
    }

    pub fn into_inner<C: Any>(self) -> Result<C> {
        self.config
            .downcast::<C>()
            .map(|boxed| *boxed)
            .map_err(|_| Error::internal("unexpected config type"))
    }
}

impl fmt::Debug for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedConfig")
            .field("references", &self.references)
            .finish_non_exhaustive()
    }
}
