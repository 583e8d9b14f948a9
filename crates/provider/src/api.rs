//! Request and response records for the [`Manager`](crate::Manager) API
//!
//! Requests deserialize from whatever front end sits on top (a JSON body, a
//! manifest entry); responses serialize for output.

use crate::plan::Plan;
use crate::schema::Attribute;
use crate::state::State;
use serde::{Deserialize, Serialize};

/// Snapshot of one live instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceMeta {
    pub name: String,
    pub resource: String,
    /// Applied state, absent until the first apply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    pub read_only: bool,
}

/// A registered resource type with its instances
#[derive(Debug, Clone, Serialize)]
pub struct ResourceMeta {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub instances: Vec<InstanceMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResourcesRequest {
    /// Only report this resource type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResourcesResponse {
    pub provider: String,
    pub description: String,
    pub version: String,
    pub resources: Vec<ResourceMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResourceInstancesRequest {
    /// Only report instances of this resource type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResourceInstancesResponse {
    pub instances: Vec<InstanceMeta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetResourceInstanceResponse {
    pub instance: InstanceMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResourceInstanceRequest {
    /// `<resource>.<label>`
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateResourceInstanceResponse {
    pub instance: InstanceMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateResourceInstanceRequest {
    #[serde(default)]
    pub attributes: State,
    /// Apply the plan instead of only computing it
    #[serde(default)]
    pub apply: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateResourceInstanceResponse {
    pub instance: InstanceMeta,
    pub plan: Plan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyResourceInstanceRequest {
    pub name: String,
    /// Also destroy everything that depends on the instance
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DestroyResourceInstanceResponse {
    /// Destroyed instances in the order they were destroyed
    pub instances: Vec<InstanceMeta>,
}
