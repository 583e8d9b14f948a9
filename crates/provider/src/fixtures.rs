//! Resource types shared by the unit tests.
//!
//! `node` is built on the instance scaffold and can depend on other nodes.
//! `MockResource` implements the instance contract by hand and has no
//! observer registry.

use crate::context::Context;
use crate::decode::Decoder;
use crate::error::{Error, Result};
use crate::instance::{InstanceCore, Managed};
use crate::plan::Plan;
use crate::resource::{InstanceRef, Resolver, Resource, ResourceInstance, ValidatedConfig};
use crate::schema::{self, Attribute, AttributeKind};
use crate::state::{Encoder, State, StateOf, WritableStateOf};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct NodeResource;

impl NodeResource {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Resource for NodeResource {
    fn name(&self) -> &str {
        "node"
    }

    fn schema(&self) -> Vec<Attribute> {
        NodeConfig::attributes()
    }

    fn new_instance(self: Arc<Self>, name: &str) -> Result<Arc<dyn ResourceInstance>> {
        Ok(Arc::new(Node {
            core: InstanceCore::new(name, self),
            events: Mutex::new(Vec::new()),
            fail_apply: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeConfig {
    pub dep: Option<InstanceRef>,
    pub deps: Vec<InstanceRef>,
    pub label: Option<String>,
    pub secret: Option<String>,
}

impl StateOf for NodeConfig {
    fn state_of(&self) -> State {
        Encoder::new()
            .reference("dep", self.dep.as_ref())
            .references("deps", &self.deps)
            .set_opt("label", self.label.clone())
            .set_opt("secret", self.secret.clone())
            .finish()
    }

    fn references(&self) -> Vec<String> {
        self.dep
            .iter()
            .chain(&self.deps)
            .map(|r| r.name().to_string())
            .collect()
    }
}

impl WritableStateOf for NodeConfig {
    fn attributes() -> Vec<Attribute> {
        vec![
            Attribute::reference("dep", Some("node")),
            Attribute::new("deps", AttributeKind::ReferenceList(Some("node".into()))),
            Attribute::new("label", AttributeKind::String),
            Attribute::new("secret", AttributeKind::String).sensitive(),
        ]
    }

    fn from_decoder(decoder: &Decoder<'_>) -> Result<Self> {
        Ok(Self {
            dep: decoder.reference("dep")?,
            deps: decoder.references("deps")?,
            label: decoder.get("label")?,
            secret: decoder.get("secret")?,
        })
    }
}

#[derive(Debug)]
pub struct Node {
    core: InstanceCore<NodeConfig>,
    events: Mutex<Vec<String>>,
    fail_apply: AtomicBool,
    fail_destroy: AtomicBool,
}

impl Node {
    /// Notifications received from dependents, as `change:<name>` / `remove:<name>`
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::SeqCst);
    }

    pub fn fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }
}

impl Managed for Node {
    type Config = NodeConfig;

    fn core(&self) -> &InstanceCore<NodeConfig> {
        &self.core
    }

    fn check(&self, _ctx: &Context, config: &NodeConfig) -> Result<()> {
        if config.label.as_deref() == Some("invalid") {
            return Err(Error::bad_request("label: \"invalid\" is reserved"));
        }
        Ok(())
    }

    fn before_apply(&self, _ctx: &Context, _config: &NodeConfig) -> Result<()> {
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(Error::failed("apply refused"));
        }
        Ok(())
    }

    fn on_destroy(&self, _ctx: &Context) -> Result<()> {
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(Error::failed(format!("{} refused to stop", self.core.name())));
        }
        Ok(())
    }

    fn on_state_change(&self, source: &dyn ResourceInstance) {
        self.events.lock().push(format!("change:{}", source.name()));
    }

    fn on_state_remove(&self, source: &dyn ResourceInstance) {
        self.events.lock().push(format!("remove:{}", source.name()));
    }
}

/// Borrow a live instance as a [`Node`]
pub fn as_node(instance: &Arc<dyn ResourceInstance>) -> &Node {
    instance
        .as_any()
        .downcast_ref::<Node>()
        .expect("instance is not a node")
}

/// Unapplied nodes keyed by name
pub fn registry(
    resource: &Arc<NodeResource>,
    names: &[&str],
) -> BTreeMap<String, Arc<dyn ResourceInstance>> {
    names
        .iter()
        .map(|name| {
            let instance = Arc::clone(resource)
                .new_instance(name)
                .expect("node instance");
            ((*name).to_string(), instance)
        })
        .collect()
}

/// A resource type whose instances implement the contract directly
#[derive(Debug)]
pub struct MockResource {
    name: String,
}

impl MockResource {
    pub fn shared(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

impl Resource for MockResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Vec<Attribute> {
        vec![
            Attribute::reference("dep", None),
            Attribute::new("password", AttributeKind::String).sensitive(),
        ]
    }

    fn new_instance(self: Arc<Self>, name: &str) -> Result<Arc<dyn ResourceInstance>> {
        if name.ends_with(".broken") {
            return Err(Error::failed("factory refused"));
        }
        Ok(Arc::new(MockInstance {
            name: name.to_string(),
            resource: self,
            applied: RwLock::new(None),
            refs: RwLock::new(Vec::new()),
        }))
    }
}

/// Stores the raw state it is given; references come from the `dep` field
#[derive(Debug)]
pub struct MockInstance {
    name: String,
    resource: Arc<dyn Resource>,
    applied: RwLock<Option<State>>,
    refs: RwLock<Vec<String>>,
}

impl ResourceInstance for MockInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource(&self) -> Arc<dyn Resource> {
        Arc::clone(&self.resource)
    }

    fn validate(
        &self,
        _ctx: &Context,
        state: &State,
        resolver: &dyn Resolver,
    ) -> Result<ValidatedConfig> {
        let refs = schema::references_in(&self.resource.schema(), state);
        if let Some(missing) = refs.iter().find(|r| resolver.resolve(r).is_none()) {
            return Err(Error::bad_request(format!("dep: reference {missing:?} not found")));
        }
        Ok(ValidatedConfig::new(state.clone(), refs))
    }

    fn plan(&self, _ctx: &Context, config: &ValidatedConfig) -> Result<Plan> {
        let desired = config.downcast_ref::<State>()?;
        Ok(Plan::diff(self.applied.read().as_ref(), desired))
    }

    fn apply(&self, _ctx: &Context, config: ValidatedConfig) -> Result<()> {
        let refs = config.references().to_vec();
        let state = config.into_inner::<State>()?;
        *self.applied.write() = Some(state);
        *self.refs.write() = refs;
        Ok(())
    }

    fn destroy(&self, _ctx: &Context) -> Result<()> {
        *self.applied.write() = None;
        self.refs.write().clear();
        Ok(())
    }

    fn read(&self, _ctx: &Context) -> Result<Option<State>> {
        Ok(self.applied.read().clone())
    }

    fn references(&self) -> Vec<String> {
        self.refs.read().clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
