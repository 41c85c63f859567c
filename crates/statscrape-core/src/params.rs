use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::Placeholder;

/// One resolved value for a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl ParamValue {
    /// Converts a stored cell into a parameter value. Nulls, floats and
    /// nested values have no meaningful rendering and yield `None`.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_i64().map(ParamValue::Int),
            JsonValue::String(s) => Some(ParamValue::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            ParamValue::Int(i) => JsonValue::from(*i),
            ParamValue::Text(s) => JsonValue::from(s.as_str()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            ParamValue::Int(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Ordered placeholder -> value mapping that produced one concrete request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    entries: Vec<(Placeholder, ParamValue)>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `placeholder`, keeping its original position if already present.
    pub fn insert(&mut self, placeholder: Placeholder, value: ParamValue) {
        match self.entries.iter_mut().find(|(p, _)| *p == placeholder) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((placeholder, value)),
        }
    }

    pub fn get(&self, placeholder: Placeholder) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(p, _)| *p == placeholder)
            .map(|(_, v)| v)
    }

    /// Looks a value up by column-style name, e.g. `"SEASON"`.
    pub fn get_by_name(&self, name: &str) -> Option<&ParamValue> {
        Placeholder::from_name(name).and_then(|p| self.get(p))
    }

    pub fn season(&self) -> Option<&str> {
        self.get(Placeholder::Season).and_then(ParamValue::as_text)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Placeholder, &ParamValue)> {
        self.entries.iter().map(|(p, v)| (*p, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (p, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}: {v}")?;
        }
        f.write_str("}")
    }
}

impl FromIterator<(Placeholder, ParamValue)> for Substitution {
    fn from_iter<I: IntoIterator<Item = (Placeholder, ParamValue)>>(iter: I) -> Self {
        let mut substitution = Substitution::new();
        for (p, v) in iter {
            substitution.insert(p, v);
        }
        substitution
    }
}
