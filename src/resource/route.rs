//! Route resource - a path prefix served on a listener

use log::debug;
use provider::{
    Attribute, AttributeKind, Context, Decoder, Encoder, Error, InstanceCore, InstanceRef, Managed,
    Resource, ResourceInstance, Result, State, StateOf, WritableStateOf,
};
use std::sync::Arc;

pub const NAME: &str = "route";

#[derive(Debug, Default)]
pub struct RouteResource;

impl RouteResource {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Resource for RouteResource {
    fn name(&self) -> &str {
        NAME
    }

    fn schema(&self) -> Vec<Attribute> {
        RouteConfig::attributes()
    }

    fn new_instance(self: Arc<Self>, name: &str) -> Result<Arc<dyn ResourceInstance>> {
        Ok(Arc::new(Route {
            core: InstanceCore::new(name, self),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteConfig {
    pub listener: InstanceRef,
    pub prefix: String,
    pub upstream: Option<String>,
    pub strip_prefix: bool,
    /// Routes matched before this one
    pub after: Vec<InstanceRef>,
    pub token: Option<String>,
}

impl StateOf for RouteConfig {
    fn state_of(&self) -> State {
        Encoder::new()
            .reference("listener", Some(&self.listener))
            .set("prefix", self.prefix.as_str())
            .set_opt("upstream", self.upstream.as_deref())
            .set("strip_prefix", self.strip_prefix)
            .references("after", &self.after)
            .set_opt("token", self.token.as_deref())
            .finish()
    }

    fn references(&self) -> Vec<String> {
        std::iter::once(&self.listener)
            .chain(&self.after)
            .map(|r| r.name().to_string())
            .collect()
    }
}

impl WritableStateOf for RouteConfig {
    fn attributes() -> Vec<Attribute> {
        vec![
            Attribute::reference("listener", Some(super::listener::NAME))
                .describe("Listener serving this route")
                .required(),
            Attribute::new("prefix", AttributeKind::String).required(),
            Attribute::new("upstream", AttributeKind::String)
                .describe("Backend URL requests are forwarded to"),
            Attribute::new("strip_prefix", AttributeKind::Bool).default_value(false),
            Attribute::new("after", AttributeKind::ReferenceList(Some(NAME.into())))
                .describe("Routes matched before this one"),
            Attribute::new("token", AttributeKind::String)
                .describe("Bearer token required by the upstream")
                .sensitive(),
        ]
    }

    fn from_decoder(decoder: &Decoder<'_>) -> Result<Self> {
        Ok(Self {
            listener: decoder.require_reference("listener")?,
            prefix: decoder.require("prefix")?,
            upstream: decoder.get("upstream")?,
            strip_prefix: decoder.require("strip_prefix")?,
            after: decoder.references("after")?,
            token: decoder.get("token")?,
        })
    }
}

#[derive(Debug)]
pub struct Route {
    core: InstanceCore<RouteConfig>,
}

impl Managed for Route {
    type Config = RouteConfig;

    fn core(&self) -> &InstanceCore<RouteConfig> {
        &self.core
    }

    fn check(&self, _ctx: &Context, config: &RouteConfig) -> Result<()> {
        if !config.prefix.starts_with('/') {
            return Err(Error::bad_request(format!(
                "prefix: {:?} must start with '/'",
                config.prefix
            )));
        }
        Ok(())
    }

    fn after_apply(&self, _ctx: &Context, config: &RouteConfig) -> Result<()> {
        debug!(
            "{} serves {} on {}",
            self.core.name(),
            config.prefix,
            config.listener.name()
        );
        Ok(())
    }
}
