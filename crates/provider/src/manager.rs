//! Registry of resource types and live instances
//!
//! The [`Manager`] is the only owner of mutable shared state. Every mutating
//! operation holds the single write lock for its whole body, graph walks
//! included, so no caller ever sees the dependency graph mid-change. Queries
//! hold the read lock.
//!
//! Graph invariants enforced here:
//!
//! - no instance transitively references itself (checked against the
//!   *proposed* references before any apply)
//! - an instance is never destroyed while something still depends on it
//! - read-only instances are never updated or destroyed, except by
//!   [`Manager::close`]

use crate::api::{
    CreateResourceInstanceRequest, CreateResourceInstanceResponse, DestroyResourceInstanceRequest,
    DestroyResourceInstanceResponse, GetResourceInstanceResponse, InstanceMeta,
    ListResourceInstancesRequest, ListResourceInstancesResponse, ListResourcesRequest,
    ListResourcesResponse, ResourceMeta, UpdateResourceInstanceRequest,
    UpdateResourceInstanceResponse,
};
use crate::context::Context;
use crate::error::{Error, Result, Stage};
use crate::graph::DependencyGraph;
use crate::plan::Plan;
use crate::resource::{ObserverFn, Resource, ResourceInstance, ValidatedConfig};
use crate::state::State;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug)]
struct Entry {
    instance: Arc<dyn ResourceInstance>,
    read_only: bool,
}

impl Entry {
    fn meta(&self, ctx: &Context) -> InstanceMeta {
        let state = match self.instance.read(ctx) {
            Ok(state) => state,
            Err(err) => {
                debug!("read {:?}: {err}", self.instance.name());
                None
            }
        };
        InstanceMeta {
            name: self.instance.name().to_string(),
            resource: self.instance.resource().name().to_string(),
            state,
            references: self.instance.references(),
            read_only: self.read_only,
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    resources: BTreeMap<String, Arc<dyn Resource>>,
    instances: BTreeMap<String, Entry>,
}

impl Registry {
    fn entry(&self, name: &str) -> Result<&Entry> {
        self.instances
            .get(name)
            .ok_or_else(|| Error::not_found(format!("resource instance {name:?}")))
    }

    fn resolve(&self, name: &str) -> Option<Arc<dyn ResourceInstance>> {
        self.instances.get(name).map(|e| Arc::clone(&e.instance))
    }

    fn graph(&self) -> DependencyGraph {
        self.instances
            .iter()
            .map(|(name, e)| (name.as_str(), e.instance.references()))
            .collect()
    }

    fn new_instance(&mut self, resource: &str, name: &str) -> Result<Arc<dyn ResourceInstance>> {
        if name.is_empty() {
            return Err(Error::bad_request("resource instance name is empty"));
        }
        let factory = self
            .resources
            .get(resource)
            .ok_or_else(|| Error::not_found(format!("resource {resource:?}")))?;
        if self.instances.contains_key(name) {
            return Err(Error::conflict(format!("resource instance {name:?}")));
        }

        let instance = create(Arc::clone(factory), name)?;
        self.instances.insert(
            name.to_string(),
            Entry {
                instance: Arc::clone(&instance),
                read_only: false,
            },
        );
        debug!("created instance {name:?} of {resource:?}");
        Ok(instance)
    }

    fn register_readonly(
        &mut self,
        ctx: &Context,
        resource: Arc<dyn Resource>,
        name: &str,
        state: &State,
    ) -> Result<Arc<dyn ResourceInstance>> {
        if name.is_empty() {
            return Err(Error::bad_request("resource instance name is empty"));
        }
        if self.instances.contains_key(name) {
            return Err(Error::conflict(format!("resource instance {name:?}")));
        }
        let instance = create(resource, name)?;

        // visible to the resolver while validating
        self.instances.insert(
            name.to_string(),
            Entry {
                instance: Arc::clone(&instance),
                read_only: false,
            },
        );
        if let Err(err) = self.validate_and_apply(ctx, &instance, state) {
            self.instances.remove(name);
            return Err(err);
        }
        if let Some(entry) = self.instances.get_mut(name) {
            entry.read_only = true;
        }
        Ok(instance)
    }

    fn validate(
        &self,
        ctx: &Context,
        instance: &Arc<dyn ResourceInstance>,
        state: &State,
    ) -> Result<ValidatedConfig> {
        let resolver = |name: &str| self.resolve(name);
        instance
            .validate(ctx, state, &resolver)
            .map_err(|e| e.in_instance(instance.name(), Stage::Validate))
    }

    fn validate_and_apply(
        &self,
        ctx: &Context,
        instance: &Arc<dyn ResourceInstance>,
        state: &State,
    ) -> Result<()> {
        let config = self.validate(ctx, instance, state)?;
        self.check_cycles(instance.name(), config.references())?;
        self.apply(ctx, instance, config)
    }

    fn check_cycles(&self, name: &str, proposed: &[String]) -> Result<()> {
        match self.graph().find_cycle(name, proposed) {
            Some(reference) => {
                debug!("rejecting {name:?} -> {reference:?}: cycle");
                Err(Error::Circular {
                    instance: name.to_string(),
                    reference: reference.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    /// References resolved at validation may have been destroyed since.
    fn check_references(&self, name: &str, proposed: &[String]) -> Result<()> {
        match proposed.iter().find(|r| !self.instances.contains_key(r.as_str())) {
            Some(missing) => {
                debug!("rejecting {name:?} -> {missing:?}: no longer registered");
                Err(Error::not_found(format!(
                    "resource instance {missing:?} referenced by {name:?}"
                )))
            }
            None => Ok(()),
        }
    }

    fn plan(
        ctx: &Context,
        instance: &Arc<dyn ResourceInstance>,
        config: &ValidatedConfig,
    ) -> Result<Plan> {
        let plan = instance
            .plan(ctx, config)
            .map_err(|e| e.in_instance(instance.name(), Stage::Plan))?;
        Ok(plan.redact(&instance.resource().schema()))
    }

    /// Apply `config`, moving the observer wiring from the old references
    /// to the new ones. A failed apply restores the old wiring.
    fn apply(
        &self,
        ctx: &Context,
        instance: &Arc<dyn ResourceInstance>,
        config: ValidatedConfig,
    ) -> Result<()> {
        self.notify_removals(instance);
        let result = instance.apply(ctx, config);
        self.wire_and_notify(instance);
        result.map_err(|e| e.in_instance(instance.name(), Stage::Apply))?;
        info!("applied {:?}", instance.name());
        Ok(())
    }

    /// Destroy and deregister one instance. On failure it stays registered
    /// and wired.
    fn destroy(&mut self, ctx: &Context, name: &str) -> Result<InstanceMeta> {
        let entry = self.entry(name)?;
        let meta = entry.meta(ctx);
        let instance = Arc::clone(&entry.instance);

        self.notify_removals(&instance);
        if let Err(err) = instance.destroy(ctx) {
            self.wire_and_notify(&instance);
            return Err(err.in_instance(name, Stage::Destroy));
        }
        self.unwire_dependents(name);
        self.instances.remove(name);
        info!("destroyed {name:?}");
        Ok(meta)
    }

    /// Observe `instance` on behalf of each dependency it references, and
    /// tell each dependency about it.
    fn wire_and_notify(&self, instance: &Arc<dyn ResourceInstance>) {
        for reference in instance.references() {
            let Some(dependency) = self.instances.get(&reference) else {
                continue;
            };
            if let Some(observable) = instance.observable() {
                let dependency = Arc::downgrade(&dependency.instance);
                let observer: ObserverFn = Arc::new(move |source: &dyn ResourceInstance| {
                    if let Some(dependency) = dependency.upgrade() {
                        dependency.on_state_change(source);
                    }
                });
                observable.add_observer(&reference, observer);
            }
            dependency.instance.on_state_change(instance.as_ref());
        }
    }

    /// Inverse of [`wire_and_notify`](Self::wire_and_notify)
    fn notify_removals(&self, instance: &Arc<dyn ResourceInstance>) {
        let observable = instance.observable();
        for reference in instance.references() {
            if let Some(observable) = observable {
                observable.remove_observer(&reference);
            }
            if let Some(dependency) = self.instances.get(&reference) {
                dependency.instance.on_state_remove(instance.as_ref());
            }
        }
    }

    /// Drop the observers dependents registered for `name`
    fn unwire_dependents(&self, name: &str) {
        for dependent in self.graph().direct_dependents(name) {
            if let Some(entry) = self.instances.get(&dependent)
                && let Some(observable) = entry.instance.observable()
            {
                observable.remove_observer(name);
            }
        }
    }
}

fn create(resource: Arc<dyn Resource>, name: &str) -> Result<Arc<dyn ResourceInstance>> {
    let resource_name = resource.name().to_string();
    let instance = resource
        .new_instance(name)
        .map_err(|e| e.in_instance(name, Stage::Create))?;
    if instance.name() != name {
        return Err(Error::bad_request(format!(
            "resource {resource_name:?} created instance {:?}, expected {name:?}",
            instance.name()
        )));
    }
    Ok(instance)
}

/// Registry and lifecycle driver for resource instances.
#[derive(Debug)]
pub struct Manager {
    name: String,
    description: String,
    version: String,
    registry: RwLock<Registry>,
}

impl Manager {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: version.into(),
            registry: RwLock::new(Registry::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Registered resource types, by name
    pub fn resources(&self) -> Vec<Arc<dyn Resource>> {
        self.registry.read().resources.values().cloned().collect()
    }

    pub fn register_resource(&self, resource: Arc<dyn Resource>) -> Result<()> {
        let name = resource.name().to_string();
        if name.is_empty() {
            return Err(Error::bad_request("resource name is empty"));
        }
        let mut registry = self.registry.write();
        if registry.resources.contains_key(&name) {
            return Err(Error::conflict(format!("resource {name:?}")));
        }
        registry.resources.insert(name.clone(), resource);
        debug!("registered resource {name:?}");
        Ok(())
    }

    /// Create an unapplied instance of a registered type under any non-empty name.
    pub fn new_instance(&self, resource: &str, name: &str) -> Result<Arc<dyn ResourceInstance>> {
        self.registry.write().new_instance(resource, name)
    }

    /// Create, validate and apply an instance, then freeze it.
    ///
    /// The resource type is registered if it is not already. On failure
    /// neither the instance nor a type registered by this call remains.
    pub fn register_readonly_instance(
        &self,
        ctx: &Context,
        resource: Arc<dyn Resource>,
        name: &str,
        state: State,
    ) -> Result<Arc<dyn ResourceInstance>> {
        ctx.check()?;
        let resource_name = resource.name().to_string();
        if resource_name.is_empty() {
            return Err(Error::bad_request("resource name is empty"));
        }

        let mut registry = self.registry.write();
        let added = !registry.resources.contains_key(&resource_name);
        if added {
            registry
                .resources
                .insert(resource_name.clone(), Arc::clone(&resource));
            debug!("registered resource {resource_name:?}");
        }

        match registry.register_readonly(ctx, resource, name, &state) {
            Ok(instance) => {
                info!("registered read-only instance {name:?}");
                Ok(instance)
            }
            Err(err) => {
                if added {
                    registry.resources.remove(&resource_name);
                }
                Err(err)
            }
        }
    }

    pub fn list_resources(
        &self,
        ctx: &Context,
        req: &ListResourcesRequest,
    ) -> Result<ListResourcesResponse> {
        ctx.check()?;
        let registry = self.registry.read();

        let filter = req
            .resource_type
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());
        if let Some(filter) = filter
            && !registry.resources.contains_key(filter)
        {
            return Err(Error::bad_request(format!(
                "resource type {filter:?} is not registered"
            )));
        }

        let resources = registry
            .resources
            .iter()
            .filter(|(name, _)| filter.is_none_or(|f| f == name.as_str()))
            .map(|(name, resource)| ResourceMeta {
                name: name.clone(),
                attributes: resource.schema(),
                instances: registry
                    .instances
                    .values()
                    .filter(|e| e.instance.resource().name() == name.as_str())
                    .map(|e| e.meta(ctx))
                    .collect(),
            })
            .collect();

        Ok(ListResourcesResponse {
            provider: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            resources,
        })
    }

    pub fn list_resource_instances(
        &self,
        ctx: &Context,
        req: &ListResourceInstancesRequest,
    ) -> Result<ListResourceInstancesResponse> {
        ctx.check()?;
        let registry = self.registry.read();

        let filter = req
            .resource
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());
        if let Some(filter) = filter
            && !registry.resources.contains_key(filter)
        {
            return Err(Error::not_found(format!("resource {filter:?}")));
        }

        let instances = registry
            .instances
            .values()
            .filter(|e| filter.is_none_or(|f| e.instance.resource().name() == f))
            .map(|e| e.meta(ctx))
            .collect();
        Ok(ListResourceInstancesResponse { instances })
    }

    pub fn get_resource_instance(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<GetResourceInstanceResponse> {
        ctx.check()?;
        let registry = self.registry.read();
        Ok(GetResourceInstanceResponse {
            instance: registry.entry(name)?.meta(ctx),
        })
    }

    /// Create an unapplied instance named `<resource>.<label>`.
    pub fn create_resource_instance(
        &self,
        ctx: &Context,
        req: &CreateResourceInstanceRequest,
    ) -> Result<CreateResourceInstanceResponse> {
        ctx.check()?;
        let resource = req
            .name
            .split_once('.')
            .filter(|(resource, label)| !resource.is_empty() && !label.is_empty())
            .map(|(resource, _)| resource)
            .ok_or_else(|| {
                Error::bad_request(format!(
                    "instance name {:?} must have the form <resource>.<label>",
                    req.name
                ))
            })?;

        let mut registry = self.registry.write();
        registry.new_instance(resource, &req.name)?;
        Ok(CreateResourceInstanceResponse {
            instance: registry.entry(&req.name)?.meta(ctx),
        })
    }

    /// Validate and plan new attributes, and apply them when requested.
    ///
    /// Plan-only calls never change the instance. The returned plan has
    /// sensitive values masked.
    pub fn update_resource_instance(
        &self,
        ctx: &Context,
        name: &str,
        req: &UpdateResourceInstanceRequest,
    ) -> Result<UpdateResourceInstanceResponse> {
        ctx.check()?;
        let registry = self.registry.write();

        let entry = registry.entry(name)?;
        if entry.read_only {
            return Err(Error::ReadOnly {
                action: "update",
                name: name.to_string(),
            });
        }
        let instance = Arc::clone(&entry.instance);

        let config = registry.validate(ctx, &instance, &req.attributes)?;
        registry.check_cycles(name, config.references())?;
        let plan = Registry::plan(ctx, &instance, &config)?;
        debug!("plan for {name:?}: {}", plan.action);

        if req.apply {
            registry.apply(ctx, &instance, config)?;
        }

        Ok(UpdateResourceInstanceResponse {
            instance: registry.entry(name)?.meta(ctx),
            plan,
        })
    }

    /// Decode and check attributes for an instance without planning.
    pub fn validate_resource_instance(
        &self,
        ctx: &Context,
        name: &str,
        state: &State,
    ) -> Result<ValidatedConfig> {
        ctx.check()?;
        let registry = self.registry.read();
        let instance = Arc::clone(&registry.entry(name)?.instance);
        registry.validate(ctx, &instance, state)
    }

    pub fn plan_resource_instance(
        &self,
        ctx: &Context,
        name: &str,
        config: &ValidatedConfig,
    ) -> Result<Plan> {
        ctx.check()?;
        let registry = self.registry.read();
        let instance = Arc::clone(&registry.entry(name)?.instance);
        Registry::plan(ctx, &instance, config)
    }

    /// Apply a configuration returned by
    /// [`validate_resource_instance`](Self::validate_resource_instance).
    ///
    /// References and cycles are checked again against the current graph,
    /// since it may have changed since validation.
    pub fn apply_resource_instance(
        &self,
        ctx: &Context,
        name: &str,
        config: ValidatedConfig,
    ) -> Result<InstanceMeta> {
        ctx.check()?;
        let registry = self.registry.write();

        let entry = registry.entry(name)?;
        if entry.read_only {
            return Err(Error::ReadOnly {
                action: "apply",
                name: name.to_string(),
            });
        }
        let instance = Arc::clone(&entry.instance);

        registry.check_references(name, config.references())?;
        registry.check_cycles(name, config.references())?;
        registry.apply(ctx, &instance, config)?;
        Ok(registry.entry(name)?.meta(ctx))
    }

    /// Destroy an instance, or with `cascade` the instance and everything
    /// that depends on it.
    ///
    /// A cascade destroys dependents before the instances they reference.
    /// It is best-effort: when a member fails, the members it depends on are
    /// skipped, the rest continue, and the failures come back as one error.
    /// Destroyed instances stay removed.
    pub fn destroy_resource_instance(
        &self,
        ctx: &Context,
        req: &DestroyResourceInstanceRequest,
    ) -> Result<DestroyResourceInstanceResponse> {
        ctx.check()?;
        let mut registry = self.registry.write();
        let name = req.name.as_str();

        if registry.entry(name)?.read_only {
            return Err(Error::ReadOnly {
                action: "destroy",
                name: name.to_string(),
            });
        }

        let graph = registry.graph();
        let order = if req.cascade {
            let mut subset = graph.dependents(name);
            subset.insert(name.to_string());
            if let Some(frozen) = subset
                .iter()
                .find(|member| registry.instances.get(*member).is_some_and(|e| e.read_only))
            {
                return Err(Error::ReadOnly {
                    action: "destroy",
                    name: frozen.clone(),
                });
            }
            graph.destroy_order(&subset)
        } else {
            if let Some(dependent) = graph.direct_dependents(name).into_iter().next() {
                return Err(Error::InUse {
                    name: name.to_string(),
                    dependent,
                });
            }
            vec![name.to_string()]
        };
        debug!("destroy order for {name:?}: {order:?}");

        let mut destroyed = Vec::with_capacity(order.len());
        let mut blocked = BTreeSet::new();
        let mut errors = Vec::new();
        for member in order {
            if graph
                .direct_dependents(&member)
                .iter()
                .any(|d| blocked.contains(d))
            {
                warn!("skipping {member:?}: a dependent is still live");
                blocked.insert(member);
                continue;
            }
            match registry.destroy(ctx, &member) {
                Ok(meta) => destroyed.push(meta),
                Err(err) => {
                    warn!("{err}");
                    blocked.insert(member);
                    errors.push(err);
                }
            }
        }

        match Error::join(errors) {
            Some(err) => {
                let names: Vec<&str> = destroyed.iter().map(|m| m.name.as_str()).collect();
                info!("destroyed before failure: {names:?}");
                Err(err)
            }
            None => Ok(DestroyResourceInstanceResponse {
                instances: destroyed,
            }),
        }
    }

    /// Destroy every instance, read-only ones included, dependents first.
    ///
    /// Failures do not stop the teardown: every instance is removed and the
    /// errors are returned joined. A cancelled `ctx` only reaches the
    /// instances' own destroy hooks.
    pub fn close(&self, ctx: &Context) -> Result<()> {
        let mut registry = self.registry.write();

        let graph = registry.graph();
        let all: BTreeSet<String> = graph.names().map(str::to_string).collect();
        let order = graph.destroy_order(&all);
        debug!("close order: {order:?}");

        let mut errors = Vec::new();
        for name in order {
            let Some(instance) = registry.resolve(&name) else {
                continue;
            };
            registry.notify_removals(&instance);
            registry.unwire_dependents(&name);
            match instance.destroy(ctx) {
                Ok(()) => info!("destroyed {name:?}"),
                Err(err) => {
                    warn!("destroy {name:?} during close: {err}");
                    errors.push(err.in_instance(&name, Stage::Destroy));
                }
            }
            registry.instances.remove(&name);
        }
        registry.instances.clear();

        Error::join(errors).map_or(Ok(()), Err)
    }
}
