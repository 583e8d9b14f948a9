//! Attribute schema for resource types
//!
//! A resource type advertises its configuration as a list of [`Attribute`]s.
//! The same table drives decoding (defaults, required fields, reference
//! resolution), plan redaction of sensitive values, and introspection through
//! `ListResources`.

use crate::state::State;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    String,
    Int,
    Uint,
    Float,
    Bool,
    /// Stored as a string such as `"5m0s"` or `"250ms"`.
    Duration,
    List(Box<AttributeKind>),
    /// String-keyed map.
    Map(Box<AttributeKind>),
    /// Name of another instance, optionally constrained to a resource type.
    Reference(Option<String>),
    /// List of instance names, optionally constrained to a resource type.
    ReferenceList(Option<String>),
}

impl AttributeKind {
    pub fn list_of(kind: AttributeKind) -> Self {
        Self::List(Box::new(kind))
    }

    pub fn map_of(kind: AttributeKind) -> Self {
        Self::Map(Box::new(kind))
    }

    /// Whether values of this kind name other instances.
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_) | Self::ReferenceList(_))
    }

    /// Resource type a reference must point at, if constrained.
    pub fn reference_type(&self) -> Option<&str> {
        match self {
            Self::Reference(t) | Self::ReferenceList(t) => t.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Int => f.write_str("int"),
            Self::Uint => f.write_str("uint"),
            Self::Float => f.write_str("float"),
            Self::Bool => f.write_str("bool"),
            Self::Duration => f.write_str("duration"),
            Self::List(inner) => write!(f, "[]{inner}"),
            Self::Map(inner) => write!(f, "map[string]{inner}"),
            Self::Reference(None) => f.write_str("ref"),
            Self::Reference(Some(t)) => write!(f, "ref({t})"),
            Self::ReferenceList(None) => f.write_str("[]ref"),
            Self::ReferenceList(Some(t)) => write!(f, "[]ref({t})"),
        }
    }
}

impl Serialize for AttributeKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A single configuration field of a resource type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: AttributeKind,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// The caller must set the field. Never true when a default exists.
    pub required: bool,

    /// Value used when the caller does not set the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Value is a secret; it is masked in plan output.
    pub sensitive: bool,

    /// Computed by the resource; ignored on input.
    pub readonly: bool,
}

impl Attribute {
    /// Create an optional attribute with no default
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            required: false,
            default: None,
            sensitive: false,
            readonly: false,
        }
    }

    /// Create a reference attribute, optionally constrained to a resource type
    pub fn reference(name: impl Into<String>, resource: Option<&str>) -> Self {
        Self::new(name, AttributeKind::Reference(resource.map(str::to_string)))
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark as required. Ignored when a default is set.
    pub fn required(mut self) -> Self {
        self.required = self.default.is_none();
        self
    }

    /// Set a default value. A field with a default is never required.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }
}

/// Find an attribute by name
pub fn find<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|a| a.name == name)
}

/// Extract instance names from the reference attributes of an undecoded state.
///
/// Values that are not strings (or lists of strings) are ignored; decoding
/// reports those as errors.
pub fn references_in(attributes: &[Attribute], state: &State) -> Vec<String> {
    let mut refs = Vec::new();
    for attr in attributes.iter().filter(|a| !a.readonly) {
        let Some(value) = state.get(&attr.name) else {
            continue;
        };
        match (&attr.kind, value) {
            (AttributeKind::Reference(_), Value::String(name)) if !name.is_empty() => {
                refs.push(name.clone());
            }
            (AttributeKind::ReferenceList(_), Value::Array(items)) => {
                refs.extend(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            }
            _ => {}
        }
    }
    refs
}
