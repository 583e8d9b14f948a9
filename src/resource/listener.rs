//! Listener resource - an address that routes attach to

use log::info;
use parking_lot::RwLock;
use provider::{
    Attribute, AttributeKind, Context, Decoder, Encoder, Error, InstanceCore, Managed, Resource,
    ResourceInstance, Result, State, StateOf, WritableStateOf,
};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const NAME: &str = "listener";

#[derive(Debug, Default)]
pub struct ListenerResource;

impl ListenerResource {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Resource for ListenerResource {
    fn name(&self) -> &str {
        NAME
    }

    fn schema(&self) -> Vec<Attribute> {
        ListenerConfig::attributes()
    }

    fn new_instance(self: Arc<Self>, name: &str) -> Result<Arc<dyn ResourceInstance>> {
        Ok(Arc::new(Listener {
            core: InstanceCore::new(name, self),
            routes: RwLock::new(BTreeSet::new()),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub address: SocketAddr,
    pub tls: bool,
    pub read_timeout: Duration,
    pub max_connections: u32,
}

impl StateOf for ListenerConfig {
    fn state_of(&self) -> State {
        Encoder::new()
            .set("address", self.address.to_string())
            .set("tls", self.tls)
            .duration("read_timeout", self.read_timeout)
            .set("max_connections", self.max_connections)
            .finish()
    }
}

impl WritableStateOf for ListenerConfig {
    fn attributes() -> Vec<Attribute> {
        vec![
            Attribute::new("address", AttributeKind::String)
                .describe("Socket address to listen on, host:port")
                .required(),
            Attribute::new("tls", AttributeKind::Bool).default_value(false),
            Attribute::new("read_timeout", AttributeKind::Duration)
                .describe("Maximum time to read a request")
                .default_value("30s"),
            Attribute::new("max_connections", AttributeKind::Uint).default_value(1024),
        ]
    }

    fn from_decoder(decoder: &Decoder<'_>) -> Result<Self> {
        let address: String = decoder.require("address")?;
        let address = address
            .parse()
            .map_err(|e| Error::bad_request(format!("address: {address:?}: {e}")))?;
        Ok(Self {
            address,
            tls: decoder.require("tls")?,
            read_timeout: decoder.require("read_timeout")?,
            max_connections: decoder.require("max_connections")?,
        })
    }
}

#[derive(Debug)]
pub struct Listener {
    core: InstanceCore<ListenerConfig>,
    routes: RwLock<BTreeSet<String>>,
}

impl Listener {
    /// Routes currently attached
    pub fn routes(&self) -> Vec<String> {
        self.routes.read().iter().cloned().collect()
    }
}

impl Managed for Listener {
    type Config = ListenerConfig;

    fn core(&self) -> &InstanceCore<ListenerConfig> {
        &self.core
    }

    fn check(&self, _ctx: &Context, config: &ListenerConfig) -> Result<()> {
        if config.max_connections == 0 {
            return Err(Error::bad_request("max_connections: must be at least 1"));
        }
        Ok(())
    }

    fn after_apply(&self, _ctx: &Context, config: &ListenerConfig) -> Result<()> {
        let scheme = if config.tls { "https" } else { "http" };
        info!(
            "{} listening on {scheme}://{} ({} route(s))",
            self.core.name(),
            config.address,
            self.routes().len()
        );
        Ok(())
    }

    fn on_destroy(&self, _ctx: &Context) -> Result<()> {
        if self.core.state().is_some() {
            info!("{} stopped", self.core.name());
        }
        Ok(())
    }

    fn on_state_change(&self, source: &dyn ResourceInstance) {
        if source.resource().name() == super::route::NAME {
            self.routes.write().insert(source.name().to_string());
        }
    }

    fn on_state_remove(&self, source: &dyn ResourceInstance) {
        self.routes.write().remove(source.name());
    }
}
