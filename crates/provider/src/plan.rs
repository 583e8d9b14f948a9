//! Plan computation - field-level diff between applied and desired state

use crate::schema::Attribute;
use crate::state::State;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Placeholder written over sensitive values
pub const REDACTED: &str = "(sensitive)";

/// Kind of change planned for an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Destroy,
    Noop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Destroy => "destroy",
            Self::Noop => "noop",
        })
    }
}

/// A single field-level diff
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub field: String,
    /// Current value (None on create)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    /// Desired value (None when the field is being unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

/// Changes that applying a configuration would make
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub action: Action,
    /// Ordered by field name. Empty for Noop.
    pub changes: Vec<Change>,
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

impl Plan {
    pub fn noop() -> Self {
        Self {
            action: Action::Noop,
            changes: Vec::new(),
        }
    }

    /// Compare a desired state against the applied one.
    ///
    /// Without an applied state every non-null desired field is a change and
    /// the action is Create. Otherwise only differing fields are listed
    /// (a null and a missing value are equal) and the action is Update, or
    /// Noop when nothing differs.
    pub fn diff(applied: Option<&State>, desired: &State) -> Self {
        let Some(applied) = applied else {
            let changes = desired
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(field, v)| Change {
                    field: field.clone(),
                    old: None,
                    new: Some(v.clone()),
                })
                .collect();
            return Self {
                action: Action::Create,
                changes,
            };
        };

        let fields: BTreeSet<&str> = applied.keys().chain(desired.keys()).collect();
        let changes: Vec<Change> = fields
            .into_iter()
            .filter_map(|field| {
                let old = present(applied.get(field));
                let new = present(desired.get(field));
                (old != new).then(|| Change {
                    field: field.to_string(),
                    old: old.cloned(),
                    new: new.cloned(),
                })
            })
            .collect();

        if changes.is_empty() {
            Self::noop()
        } else {
            Self {
                action: Action::Update,
                changes,
            }
        }
    }

    /// Plan for tearing down an instance with the given applied state
    pub fn destroy(applied: Option<&State>) -> Self {
        let changes = applied
            .map(|state| {
                state
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(field, v)| Change {
                        field: field.clone(),
                        old: Some(v.clone()),
                        new: None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            action: Action::Destroy,
            changes,
        }
    }

    /// Mask the values of sensitive attributes
    pub fn redact(mut self, attributes: &[Attribute]) -> Self {
        for change in &mut self.changes {
            let sensitive = attributes
                .iter()
                .any(|a| a.sensitive && a.name == change.field);
            if sensitive {
                if change.old.is_some() {
                    change.old = Some(Value::from(REDACTED));
                }
                if change.new.is_some() {
                    change.new = Some(Value::from(REDACTED));
                }
            }
        }
        self
    }

    pub fn is_noop(&self) -> bool {
        self.action == Action::Noop
    }

    pub fn change(&self, field: &str) -> Option<&Change> {
        self.changes.iter().find(|c| c.field == field)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.changes.is_empty() {
            return write!(f, "{} (no changes)", self.action);
        }
        writeln!(f, "{}:", self.action)?;
        for (i, change) in self.changes.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match (&change.old, &change.new) {
                (None, Some(new)) => write!(f, "  + {} = {new}", change.field)?,
                (Some(old), None) => write!(f, "  - {} = {old}", change.field)?,
                (Some(old), Some(new)) => write!(f, "  ~ {}: {old} -> {new}", change.field)?,
                (None, None) => write!(f, "  ? {}", change.field)?,
            }
        }
        Ok(())
    }
}
