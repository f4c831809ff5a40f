use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key every effect uses for its bypass flag in a snapshot.
pub const BYPASSED_KEY: &str = "bypassed";

/// Declaration of one automatable parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    /// Stable key, used in snapshots and host layouts.
    pub id: &'static str,
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub default: f32,
    pub unit: &'static str,
}

impl ParameterSpec {
    pub const fn new(
        id: &'static str,
        name: &'static str,
        min: f32,
        max: f32,
        step: f32,
        default: f32,
        unit: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            min,
            max,
            step,
            default,
            unit,
        }
    }

    /// Clamp into range; NaN falls back to the default.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

/// A host-facing parameter: an effect's [`ParameterSpec`] under a chain-unique id.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub id: String,
    pub effect_index: usize,
    pub spec: ParameterSpec,
}

/// Flat name -> value dictionary capturing an effect's configurable state.
///
/// Stored as a JSON object so that a single malformed value only affects its own key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSnapshot(Map<String, Value>);

impl ParameterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_float(mut self, name: &str, value: f32) -> Self {
        self.set_float(name, value);
        self
    }

    pub fn with_bool(mut self, name: &str, value: bool) -> Self {
        self.set_bool(name, value);
        self
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.0.insert(name.to_owned(), Value::from(value));
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.0.insert(name.to_owned(), Value::Bool(value));
    }

    /// Finite numeric value for `name`, if present and well formed.
    pub fn get_float(&self, name: &str) -> Option<f32> {
        self.0
            .get(name)
            .and_then(Value::as_f64)
            .map(|v| v as f32)
            .filter(|v| v.is_finite())
    }

    /// Boolean value for `name`. Numbers (non-zero is true) and "true"/"false" strings are accepted.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.0.get(name)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            Value::String(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl From<Map<String, Value>> for ParameterSnapshot {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
