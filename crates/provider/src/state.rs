//! State container and typed config mapping
//!
//! [`State`] is the external form of an instance's configuration: an ordered
//! map of attribute name to JSON value. Config types convert to it with
//! [`StateOf`] and are built from it with [`WritableStateOf`], both driven by
//! the resource type's attribute table rather than by reflection.

use crate::decode::{Decoder, format_duration};
use crate::error::Result;
use crate::resource::{InstanceRef, Resolver};
use crate::schema::Attribute;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::time::Duration;

/// Ordered attribute name → value mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(BTreeMap<String, Value>);

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for State {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for State {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<BTreeMap<String, Value>> for State {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl IntoIterator for State {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a State {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Encode a typed configuration back into a [`State`].
pub trait StateOf {
    /// External representation of this configuration
    fn state_of(&self) -> State;

    /// Names of the instances this configuration references
    fn references(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Decode a typed configuration from a [`State`].
pub trait WritableStateOf: Sized {
    /// Attribute table for this configuration type
    fn attributes() -> Vec<Attribute>;

    /// Read fields out of the decoder.
    ///
    /// Implementations call the decoder's getters for each attribute; the
    /// decoder applies defaults, enforces required fields and resolves
    /// references.
    fn from_decoder(decoder: &Decoder<'_>) -> Result<Self>;

    /// Decode `state`, rejecting attributes the type does not declare.
    fn decode(state: &State, resolver: &dyn Resolver) -> Result<Self> {
        let decoder = Decoder::new(state, Self::attributes(), resolver);
        let config = Self::from_decoder(&decoder)?;
        decoder.finish()?;
        Ok(config)
    }
}

/// Builder for the [`State`] of a configuration.
#[derive(Debug, Default)]
pub struct Encoder {
    state: State,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.state.insert(name, value);
        self
    }

    /// Set a field only when it has a value
    pub fn set_opt<V: Into<Value>>(&mut self, name: &str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.state.insert(name, v);
        }
        self
    }

    /// Set a field from any serializable value (maps, nested lists).
    pub fn set_serialized<T: Serialize>(&mut self, name: &str, value: &T) -> &mut Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.state.insert(name, value);
        self
    }

    pub fn duration(&mut self, name: &str, value: Duration) -> &mut Self {
        self.state.insert(name, format_duration(value));
        self
    }

    /// References are stored by instance name
    pub fn reference(&mut self, name: &str, value: Option<&InstanceRef>) -> &mut Self {
        if let Some(r) = value {
            self.state.insert(name, r.name());
        }
        self
    }

    pub fn references(&mut self, name: &str, values: &[InstanceRef]) -> &mut Self {
        if !values.is_empty() {
            let names: Vec<Value> = values.iter().map(|r| Value::from(r.name())).collect();
            self.state.insert(name, Value::Array(names));
        }
        self
    }

    pub fn finish(&mut self) -> State {
        std::mem::take(&mut self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_is_ordered() {
        let state = State::from([("zeta", json!(1)), ("alpha", json!(2)), ("mid", json!(3))]);
        let keys: Vec<&str> = state.keys().collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_state_serde_is_transparent() {
        let state: State = serde_json::from_str(r#"{"port": 8080, "host": "localhost"}"#).unwrap();
        assert_eq!(state.get("port"), Some(&json!(8080)));
        assert_eq!(
            serde_json::to_string(&state).unwrap(),
            r#"{"host":"localhost","port":8080}"#
        );
    }

    #[test]
    fn test_encoder() {
        let mut enc = Encoder::new();
        enc.set("name", "main")
            .set_opt::<i64>("port", None)
            .set_opt("tls", Some(true))
            .duration("timeout", Duration::from_secs(300))
            .set_serialized("headers", &BTreeMap::from([("x", "y")]));
        let state = enc.finish();

        assert_eq!(state.get("name"), Some(&json!("main")));
        assert!(!state.contains_key("port"));
        assert_eq!(state.get("tls"), Some(&json!(true)));
        assert_eq!(state.get("timeout"), Some(&json!("5m0s")));
        assert_eq!(state.get("headers"), Some(&json!({"x": "y"})));
    }
}
