//! Manifest lifecycle commands
//!
//! - `plan` - create the manifest's instances and show what applying would change
//! - `apply` - apply them in dependency order, report, then tear everything down

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use provider::{
    Attribute, CreateResourceInstanceRequest, DependencyGraph, InstanceMeta,
    ListResourceInstancesRequest, Manager, Plan, UpdateResourceInstanceRequest, schema,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::Context;
use crate::config::{self, InstanceSpec, Manifest};
use crate::resource;
use crate::ui;

/// A planned or applied change to one instance
pub type NamedPlan = (String, Plan);

pub fn plan(ctx: &Context, manifest: Option<&Path>) -> Result<()> {
    let (path, manifest) = load(manifest)?;
    let manager = manager_for(&manifest)?;
    let lc = provider::Context::background();

    let plans = plan_manifest(&manager, &lc, &manifest);
    let closed = manager.close(&lc);
    let plans = plans?;

    ui::header(&format!("Plan: {}", path.display()));
    for (name, plan) in &plans {
        ui::plan(name, plan);
    }
    if !ctx.quiet {
        summarize(&plans);
    }
    closed.context("Failed to discard planned instances")?;
    Ok(())
}

pub fn apply(ctx: &Context, manifest: Option<&Path>, json: bool) -> Result<()> {
    let (path, manifest) = load(manifest)?;
    let manager = manager_for(&manifest)?;
    let lc = provider::Context::background();

    let plans = match apply_manifest(&manager, &lc, &manifest) {
        Ok(plans) => plans,
        Err(err) => {
            if let Err(close_err) = manager.close(&lc) {
                log::warn!("teardown after failed apply: {close_err}");
            }
            return Err(err);
        }
    };
    let instances = manager
        .list_resource_instances(&lc, &ListResourceInstancesRequest::default())?
        .instances;

    if json {
        println!("{}", serde_json::to_string_pretty(&instances)?);
    } else {
        ui::header(&format!("Apply: {}", path.display()));
        let total = plans.len();
        for (i, (name, plan)) in plans.iter().enumerate() {
            ui::step(i + 1, total, &format!("{} {}", name.bold(), plan.action));
        }
        ui::section("Instances");
        for meta in &instances {
            ui::instance(meta);
        }
        ui::section("Teardown");
        for (name, plan) in teardown_plans(&manager, &instances) {
            ui::plan(&name, &plan);
        }
    }

    manager.close(&lc).context("Teardown failed")?;
    if !json && !ctx.quiet {
        println!();
        ui::success(&format!("Applied and tore down {} instance(s)", instances.len()));
    }
    Ok(())
}

fn load(explicit: Option<&Path>) -> Result<(std::path::PathBuf, Manifest)> {
    let path = config::manifest_path(explicit)?;
    let manifest = Manifest::load(&path)?;
    Ok((path, manifest))
}

fn manager_for(manifest: &Manifest) -> Result<Manager> {
    let identity = &manifest.provider;
    let manager = Manager::new(&identity.name, &identity.description, &identity.version);
    resource::register_all(&manager).context("Failed to register resource types")?;
    Ok(manager)
}

fn schemas(manager: &Manager) -> BTreeMap<String, Vec<Attribute>> {
    manager
        .resources()
        .iter()
        .map(|r| (r.name().to_string(), r.schema()))
        .collect()
}

/// Manifest entries ordered so each comes after the entries it references
pub fn apply_order<'m>(manager: &Manager, manifest: &'m Manifest) -> Result<Vec<&'m InstanceSpec>> {
    let schemas = schemas(manager);
    let mut graph = DependencyGraph::new();
    for spec in &manifest.instances {
        let Some(attributes) = schemas.get(spec.resource()) else {
            bail!(
                "Unknown resource type '{}' for instance '{}'",
                spec.resource(),
                spec.name
            );
        };
        graph.insert(
            spec.name.clone(),
            schema::references_in(attributes, &spec.attributes),
        );
    }
    Ok(graph
        .apply_order()
        .iter()
        .filter_map(|name| manifest.find(name))
        .collect())
}

fn create(manager: &Manager, lc: &provider::Context, spec: &InstanceSpec) -> Result<()> {
    let request = CreateResourceInstanceRequest {
        name: spec.name.clone(),
    };
    manager
        .create_resource_instance(lc, &request)
        .with_context(|| format!("Failed to create {}", spec.name))?;
    Ok(())
}

fn update(
    manager: &Manager,
    lc: &provider::Context,
    spec: &InstanceSpec,
    apply: bool,
) -> Result<Plan> {
    let request = UpdateResourceInstanceRequest {
        attributes: spec.attributes.clone(),
        apply,
    };
    let verb = if apply { "apply" } else { "plan" };
    let response = manager
        .update_resource_instance(lc, &spec.name, &request)
        .with_context(|| format!("Failed to {verb} {}", spec.name))?;
    Ok(response.plan)
}

/// Create every instance and plan it without applying
pub fn plan_manifest(
    manager: &Manager,
    lc: &provider::Context,
    manifest: &Manifest,
) -> Result<Vec<NamedPlan>> {
    let order = apply_order(manager, manifest)?;
    // all instances exist before any is planned so references resolve
    for spec in &order {
        create(manager, lc, spec)?;
    }
    order
        .iter()
        .map(|spec| Ok((spec.name.clone(), update(manager, lc, spec, false)?)))
        .collect()
}

/// Apply every instance in dependency order
///
/// Read-only entries are registered frozen at their turn; the rest are
/// created up front and applied one by one.
pub fn apply_manifest(
    manager: &Manager,
    lc: &provider::Context,
    manifest: &Manifest,
) -> Result<Vec<NamedPlan>> {
    let order = apply_order(manager, manifest)?;
    let schemas = schemas(manager);
    for spec in order.iter().filter(|s| !s.readonly) {
        create(manager, lc, spec)?;
    }

    let mut plans = Vec::with_capacity(order.len());
    for spec in order {
        if spec.readonly {
            let Some(resource) = manager
                .resources()
                .into_iter()
                .find(|r| r.name() == spec.resource())
            else {
                bail!("Unknown resource type '{}'", spec.resource());
            };
            manager
                .register_readonly_instance(lc, resource, &spec.name, spec.attributes.clone())
                .with_context(|| format!("Failed to register {}", spec.name))?;
            let state = manager.get_resource_instance(lc, &spec.name)?.instance.state;
            let plan = Plan::diff(None, &state.unwrap_or_default());
            plans.push((spec.name.clone(), redact(plan, &schemas, spec.resource())));
        } else {
            plans.push((spec.name.clone(), update(manager, lc, spec, true)?));
        }
    }
    Ok(plans)
}

fn redact(plan: Plan, schemas: &BTreeMap<String, Vec<Attribute>>, resource: &str) -> Plan {
    match schemas.get(resource) {
        Some(attributes) => plan.redact(attributes),
        None => plan,
    }
}

/// Destroy plans for `instances`, dependents first
pub fn teardown_plans(manager: &Manager, instances: &[InstanceMeta]) -> Vec<NamedPlan> {
    let schemas = schemas(manager);
    let graph: DependencyGraph = instances
        .iter()
        .map(|m| (m.name.as_str(), m.references.clone()))
        .collect();
    let all: BTreeSet<String> = graph.names().map(str::to_string).collect();

    graph
        .destroy_order(&all)
        .into_iter()
        .filter_map(|name| {
            let meta = instances.iter().find(|m| m.name == name)?;
            let plan = redact(Plan::destroy(meta.state.as_ref()), &schemas, &meta.resource);
            Some((name, plan))
        })
        .collect()
}

fn summarize(plans: &[NamedPlan]) {
    let changed = plans.iter().filter(|(_, p)| !p.is_noop()).count();
    println!();
    ui::info(&format!(
        "{changed} of {} instance(s) would change",
        plans.len()
    ));
}
