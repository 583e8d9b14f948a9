//! Generic instance scaffold
//!
//! [`InstanceCore`] holds what every instance has: its name, the resource
//! type it belongs to, the applied configuration snapshot and an observer
//! registry. A concrete type embeds one, implements [`Managed`], and gets a
//! complete [`ResourceInstance`] implementation from the blanket impl below.
//!
//! ```ignore
//! #[derive(Debug)]
//! struct Listener {
//!     core: InstanceCore<ListenerConfig>,
//! }
//!
//! impl Managed for Listener {
//!     type Config = ListenerConfig;
//!
//!     fn core(&self) -> &InstanceCore<ListenerConfig> {
//!         &self.core
//!     }
//!
//!     fn before_apply(&self, _ctx: &Context, config: &ListenerConfig) -> Result<()> {
//!         bind(&config.address)
//!     }
//! }
//! ```

use crate::context::Context;
use crate::error::Result;
use crate::plan::Plan;
use crate::resource::{
    Observable, ObserverFn, Resolver, Resource, ResourceInstance, ValidatedConfig,
};
use crate::state::{State, StateOf, WritableStateOf};
use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Shared per-instance state.
pub struct InstanceCore<C> {
    name: String,
    resource: Arc<dyn Resource>,
    state: ArcSwapOption<C>,
    observers: RwLock<BTreeMap<String, ObserverFn>>,
}

impl<C> InstanceCore<C> {
    pub fn new(name: impl Into<String>, resource: Arc<dyn Resource>) -> Self {
        Self {
            name: name.into(),
            resource,
            state: ArcSwapOption::empty(),
            observers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> Arc<dyn Resource> {
        Arc::clone(&self.resource)
    }

    /// The applied configuration, `None` until the first apply
    pub fn state(&self) -> Option<Arc<C>> {
        self.state.load_full()
    }

    /// Replace the applied configuration without notifying observers
    pub fn set_state(&self, config: Option<Arc<C>>) {
        self.state.store(config);
    }

    /// Replace the applied configuration, then notify observers with `source`
    pub fn set_state_and_notify(&self, config: Arc<C>, source: &dyn ResourceInstance) {
        self.state.store(Some(config));
        self.notify_observers(source);
    }

    /// Call every observer with `source`.
    ///
    /// Callbacks run after the observer lock is released, so they may add
    /// or remove observers on this instance.
    pub fn notify_observers(&self, source: &dyn ResourceInstance) {
        let snapshot: Vec<ObserverFn> = self.observers.read().values().cloned().collect();
        for observer in snapshot {
            observer(source);
        }
    }

    pub fn observer_ids(&self) -> Vec<String> {
        self.observers.read().keys().cloned().collect()
    }
}

impl<C: StateOf> InstanceCore<C> {
    /// Diff `desired` against the applied configuration
    pub fn plan(&self, desired: &C) -> Plan {
        let applied = self.state().map(|c| c.state_of());
        Plan::diff(applied.as_ref(), &desired.state_of())
    }

    pub fn read(&self) -> Option<State> {
        self.state().map(|c| c.state_of())
    }

    pub fn references(&self) -> Vec<String> {
        self.state().map(|c| c.references()).unwrap_or_default()
    }
}

impl<C> Observable for InstanceCore<C> {
    fn add_observer(&self, id: &str, observer: ObserverFn) {
        self.observers.write().insert(id.to_string(), observer);
    }

    fn remove_observer(&self, id: &str) {
        self.observers.write().remove(id);
    }
}

impl<C> fmt::Debug for InstanceCore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCore")
            .field("name", &self.name)
            .field("resource", &self.resource.name())
            .field("applied", &self.state.load().is_some())
            .field("observers", &self.observer_ids())
            .finish()
    }
}

/// Lifecycle hooks for a type built on [`InstanceCore`].
///
/// Every hook has a default, so the minimal implementation only names the
/// config type and returns the core.
pub trait Managed: Send + Sync + fmt::Debug + 'static {
    type Config: StateOf + WritableStateOf + Send + Sync + 'static;

    fn core(&self) -> &InstanceCore<Self::Config>;

    /// Type-specific checks after decoding
    fn check(&self, _ctx: &Context, _config: &Self::Config) -> Result<()> {
        Ok(())
    }

    /// Runs before the new configuration becomes visible. An error leaves
    /// the previous configuration in place.
    fn before_apply(&self, _ctx: &Context, _config: &Self::Config) -> Result<()> {
        Ok(())
    }

    /// Runs after the swap and observer notification
    fn after_apply(&self, _ctx: &Context, _config: &Self::Config) -> Result<()> {
        Ok(())
    }

    /// Release resources. The applied configuration is cleared afterwards.
    fn on_destroy(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    fn on_state_change(&self, _source: &dyn ResourceInstance) {}

    fn on_state_remove(&self, _source: &dyn ResourceInstance) {}
}

impl<T: Managed> ResourceInstance for T {
    fn name(&self) -> &str {
        self.core().name()
    }

    fn resource(&self) -> Arc<dyn Resource> {
        self.core().resource()
    }

    fn validate(
        &self,
        ctx: &Context,
        state: &State,
        resolver: &dyn Resolver,
    ) -> Result<ValidatedConfig> {
        let config = T::Config::decode(state, resolver)?;
        self.check(ctx, &config)?;
        let references = StateOf::references(&config);
        Ok(ValidatedConfig::new(config, references))
    }

    fn plan(&self, _ctx: &Context, config: &ValidatedConfig) -> Result<Plan> {
        let desired = config.downcast_ref::<T::Config>()?;
        Ok(self.core().plan(desired))
    }

    fn apply(&self, ctx: &Context, config: ValidatedConfig) -> Result<()> {
        let config = Arc::new(config.into_inner::<T::Config>()?);
        self.before_apply(ctx, &config)?;
        self.core().set_state_and_notify(Arc::clone(&config), self);
        self.after_apply(ctx, &config)
    }

    fn destroy(&self, ctx: &Context) -> Result<()> {
        self.on_destroy(ctx)?;
        self.core().set_state(None);
        Ok(())
    }

    fn read(&self, _ctx: &Context) -> Result<Option<State>> {
        Ok(self.core().read())
    }

    fn references(&self) -> Vec<String> {
        self.core().references()
    }

    fn observable(&self) -> Option<&dyn Observable> {
        Some(self.core())
    }

    fn on_state_change(&self, source: &dyn ResourceInstance) {
        Managed::on_state_change(self, source);
    }

    fn on_state_remove(&self, source: &dyn ResourceInstance) {
        Managed::on_state_remove(self, source);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures::{Node, NodeResource, registry};
    use crate::plan::Action;
    use crate::resource::NoResolver;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn node(instance: &Arc<dyn ResourceInstance>) -> &Node {
        instance.as_any().downcast_ref::<Node>().unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let ctx = Context::background();
        let resource = NodeResource::shared();
        let instances = registry(&resource, &["a", "b"]);
        let a = &instances["a"];
        let resolver = |name: &str| instances.get(name).cloned();

        assert_eq!(a.name(), "a");
        assert_eq!(a.resource().name(), "node");
        assert!(a.read(&ctx).unwrap().is_none());
        assert!(a.references().is_empty());

        let desired = State::from([("dep", json!("b")), ("label", json!("first"))]);
        let config = a.validate(&ctx, &desired, &resolver).unwrap();
        assert_eq!(config.references(), ["b"]);

        let plan = a.plan(&ctx, &config).unwrap();
        assert_eq!(plan.action, Action::Create);
        assert_eq!(plan.changes.len(), 2);

        a.apply(&ctx, config).unwrap();
        assert_eq!(a.references(), vec!["b"]);
        assert_eq!(a.read(&ctx).unwrap(), Some(desired.clone()));

        let config = a.validate(&ctx, &desired, &resolver).unwrap();
        assert!(a.plan(&ctx, &config).unwrap().is_noop());

        a.destroy(&ctx).unwrap();
        assert!(a.read(&ctx).unwrap().is_none());
        assert!(a.references().is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let ctx = Context::background();
        let resource = NodeResource::shared();
        let instances = registry(&resource, &["a"]);
        let a = &instances["a"];

        let err = a
            .validate(&ctx, &State::from([("dep", "ghost")]), &NoResolver)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = a
            .validate(&ctx, &State::from([("colour", "red")]), &NoResolver)
            .unwrap_err();
        assert!(err.to_string().contains("unknown attribute"));

        // check hook: a node may not be labelled "invalid"
        let err = a
            .validate(&ctx, &State::from([("label", "invalid")]), &NoResolver)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_apply_with_wrong_config_type() {
        let ctx = Context::background();
        let resource = NodeResource::shared();
        let instances = registry(&resource, &["a"]);
        let a = &instances["a"];

        let err = a
            .apply(&ctx, ValidatedConfig::new(7u8, Vec::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(a.read(&ctx).unwrap().is_none());
    }

    #[test]
    fn test_failed_apply_keeps_previous_state() {
        let ctx = Context::background();
        let resource = NodeResource::shared();
        let instances = registry(&resource, &["a"]);
        let a = &instances["a"];

        let first = State::from([("label", "one")]);
        let config = a.validate(&ctx, &first, &NoResolver).unwrap();
        a.apply(&ctx, config).unwrap();

        node(a).fail_apply(true);
        let config = a
            .validate(&ctx, &State::from([("label", "two")]), &NoResolver)
            .unwrap();
        assert!(a.apply(&ctx, config).is_err());
        assert_eq!(a.read(&ctx).unwrap(), Some(first));
    }

    #[test]
    fn test_observers_fire_after_apply() {
        let ctx = Context::background();
        let resource = NodeResource::shared();
        let instances = registry(&resource, &["a"]);
        let a = &instances["a"];
        let observable = a.observable().unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        observable.add_observer(
            "watcher",
            Arc::new(move |source: &dyn ResourceInstance| {
                assert_eq!(source.name(), "a");
                // state is already swapped when observers run
                assert!(source.read(&Context::background()).unwrap().is_some());
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let config = a.validate(&ctx, &State::new(), &NoResolver).unwrap();
        a.apply(&ctx, config).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // same id replaces, it does not add
        let seen = Arc::clone(&calls);
        observable.add_observer(
            "watcher",
            Arc::new(move |_: &dyn ResourceInstance| {
                seen.fetch_add(10, Ordering::SeqCst);
            }),
        );
        let config = a.validate(&ctx, &State::new(), &NoResolver).unwrap();
        a.apply(&ctx, config).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 11);

        observable.remove_observer("watcher");
        let config = a.validate(&ctx, &State::new(), &NoResolver).unwrap();
        a.apply(&ctx, config).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_observer_may_mutate_observers() {
        let ctx = Context::background();
        let resource = NodeResource::shared();
        let instances = registry(&resource, &["a"]);
        let a = &instances["a"];

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        a.observable().unwrap().add_observer(
            "once",
            Arc::new(move |source: &dyn ResourceInstance| {
                seen.fetch_add(1, Ordering::SeqCst);
                let observable = source.observable().unwrap();
                observable.remove_observer("once");
                observable.add_observer("later", Arc::new(|_: &dyn ResourceInstance| {}));
            }),
        );

        let config = a.validate(&ctx, &State::new(), &NoResolver).unwrap();
        a.apply(&ctx, config).unwrap();
        let config = a.validate(&ctx, &State::new(), &NoResolver).unwrap();
        a.apply(&ctx, config).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(node(a).core().observer_ids(), vec!["later"]);
    }

    #[test]
    fn test_debug_output() {
        let resource = NodeResource::shared();
        let instances = registry(&resource, &["a"]);
        let debug = format!("{:?}", node(&instances["a"]).core());
        assert!(debug.contains("name: \"a\""));
        assert!(debug.contains("resource: \"node\""));
        assert!(debug.contains("applied: false"));
    }
}
