//! Schema-driven decoding of [`State`] values
//!
//! The [`Decoder`] is the read side of [`WritableStateOf`](crate::WritableStateOf):
//! config types ask it for each declared attribute and get back a typed value
//! with defaults applied, required fields enforced and references resolved to
//! live instances.
//!
//! Values are accepted loosely, the way they arrive from JSON bodies and TOML
//! files: integers may come as floats without a fraction or as numeric
//! strings, booleans as `"true"`/`"1"`, durations as strings like `"1m30s"`.

use crate::error::{Error, Result};
use crate::resource::{InstanceRef, Resolver};
use crate::schema::{self, Attribute};
use crate::state::State;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Conversion from a JSON value to a typed field.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> std::result::Result<Self, String>;
}

/// Reads typed attributes out of a [`State`].
pub struct Decoder<'a> {
    state: &'a State,
    attributes: Vec<Attribute>,
    resolver: &'a dyn Resolver,
}

impl<'a> Decoder<'a> {
    pub fn new(state: &'a State, attributes: Vec<Attribute>, resolver: &'a dyn Resolver) -> Self {
        Self {
            state,
            attributes,
            resolver,
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Get an optional field, falling back to the attribute's default
    pub fn get<T: FromValue>(&self, name: &str) -> Result<Option<T>> {
        self.raw(name)?
            .map(|v| T::from_value(&v).map_err(|e| Error::bad_request(format!("{name}: {e}"))))
            .transpose()
    }

    /// Get a field that must be present (set or defaulted)
    pub fn require<T: FromValue>(&self, name: &str) -> Result<T> {
        self.get(name)?
            .ok_or_else(|| Error::bad_request(format!("{name}: required")))
    }

    /// Resolve a single reference field
    pub fn reference(&self, name: &str) -> Result<Option<InstanceRef>> {
        let attr = self.attribute(name)?;
        let Some(value) = self.raw(name)? else {
            return Ok(None);
        };
        let target = match value {
            Value::String(s) => s,
            other => {
                return Err(Error::bad_request(format!(
                    "{name}: expected instance name, got {}",
                    type_name(&other)
                )));
            }
        };
        if target.is_empty() {
            if attr.required {
                return Err(Error::bad_request(format!(
                    "{name}: required reference not set"
                )));
            }
            return Ok(None);
        }
        self.resolve(attr, &target).map(Some)
    }

    /// Resolve a reference field that must be set
    pub fn require_reference(&self, name: &str) -> Result<InstanceRef> {
        self.reference(name)?.ok_or_else(|| {
            Error::bad_request(format!("{name}: required reference not set"))
        })
    }

    /// Resolve a list-of-references field. Absent means empty.
    pub fn references(&self, name: &str) -> Result<Vec<InstanceRef>> {
        let attr = self.attribute(name)?;
        let names: Vec<String> = self.get(name)?.unwrap_or_default();
        names
            .iter()
            .map(|target| self.resolve(attr, target))
            .collect()
    }

    /// Reject attributes the config type does not declare.
    pub fn finish(self) -> Result<()> {
        let unknown: Vec<&str> = self
            .state
            .keys()
            .filter(|key| schema::find(&self.attributes, key).is_none())
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::bad_request(format!(
                "unknown attribute(s): {}",
                unknown.join(", ")
            )))
        }
    }

    fn attribute(&self, name: &str) -> Result<&Attribute> {
        schema::find(&self.attributes, name)
            .ok_or_else(|| Error::internal(format!("attribute {name:?} is not declared")))
    }

    fn raw(&self, name: &str) -> Result<Option<Value>> {
        let attr = self.attribute(name)?;
        // computed by the resource, never taken from input
        if attr.readonly {
            return Ok(None);
        }
        match self.state.get(name) {
            Some(value) if !value.is_null() => Ok(Some(value.clone())),
            _ => match &attr.default {
                Some(default) => Ok(Some(default.clone())),
                None if attr.required => Err(Error::bad_request(format!("{name}: required"))),
                None => Ok(None),
            },
        }
    }

    fn resolve(&self, attr: &Attribute, target: &str) -> Result<InstanceRef> {
        let instance = self.resolver.resolve(target).ok_or_else(|| {
            Error::bad_request(format!(
                "{}: reference {target:?} not found",
                attr.name
            ))
        })?;
        if let Some(want) = attr.kind.reference_type() {
            let got = instance.resource().name().to_string();
            if got != want {
                return Err(Error::bad_request(format!(
                    "{}: must be of type {want:?}, got {got:?}",
                    attr.name
                )));
            }
        }
        Ok(InstanceRef::new(instance))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// FromValue implementations
// ============================================================================

impl FromValue for Value {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(format!("expected string, got {}", type_name(other))),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => match s.trim() {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
                other => Err(format!("invalid boolean {other:?}")),
            },
            other => Err(format!("expected bool, got {}", type_name(other))),
        }
    }
}

fn integer_of(value: &Value) -> std::result::Result<i128, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i128::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(i128::from(u))
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                if f.is_finite() && f.fract() == 0.0 {
                    Ok(f as i128)
                } else {
                    Err(format!("expected integer, got {f}"))
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i128>()
            .map_err(|_| format!("invalid integer {s:?}")),
        other => Err(format!("expected integer, got {}", type_name(other))),
    }
}

macro_rules! integer_from_value {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> std::result::Result<Self, String> {
                    let i = integer_of(value)?;
                    <$t>::try_from(i)
                        .map_err(|_| format!("{i} out of range for {}", stringify!($t)))
                }
            }
        )*
    };
}

integer_from_value!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| format!("invalid number {n}")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("invalid number {s:?}")),
            other => Err(format!("expected float, got {}", type_name(other))),
        }
    }
}

impl FromValue for Duration {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::String(s) => parse_duration(s),
            other => Err(format!("expected string for duration, got {}", type_name(other))),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| T::from_value(v).map_err(|e| format!("index {i}: {e}")))
                .collect(),
            other => Err(format!("expected array, got {}", type_name(other))),
        }
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| {
                    T::from_value(v)
                        .map(|t| (k.clone(), t))
                        .map_err(|e| format!("key {k:?}: {e}"))
                })
                .collect(),
            other => Err(format!("expected map, got {}", type_name(other))),
        }
    }
}

// ============================================================================
// Durations
// ============================================================================

/// Parse a duration such as `"300ms"`, `"1.5s"` or `"1h30m"`.
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. A bare `"0"` is allowed.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let input = s.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut nanos = 0f64;
    let mut rest = input;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(format!("invalid duration {input:?}"));
        }
        let (number, tail) = rest.split_at(num_len);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid duration {input:?}"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration {input:?}")),
            other => return Err(format!("unknown unit {other:?} in duration {input:?}")),
        };
        nanos += value * scale;
        rest = tail;
    }
    let nanos = nanos.round();
    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return Err(format!("duration {input:?} out of range"));
    }
    Ok(Duration::from_nanos(nanos as u64))
}

/// Format a duration the way [`parse_duration`] reads it: `"5m0s"`, `"1.5s"`, `"250ms"`.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d < Duration::from_secs(1) {
        let nanos = d.subsec_nanos();
        return if nanos % 1_000_000 == 0 {
            format!("{}ms", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{}µs", nanos / 1_000)
        } else {
            format!("{nanos}ns")
        };
    }

    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let frac = d.subsec_nanos();
    let seconds = if frac == 0 {
        s.to_string()
    } else {
        format!("{s}.{frac:09}").trim_end_matches('0').to_string()
    };
    if h > 0 {
        format!("{h}h{m}m{seconds}s")
    } else if m > 0 {
        format!("{m}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
