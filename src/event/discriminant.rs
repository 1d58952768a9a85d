use std::fmt;
use std::hash::{Hash, Hasher};

use super::{LogEvent, Value};

/// An event discriminant identifies a distinguishable subset of events.
/// Intended for dissecting streams of events to sub-streams, for instance to
/// be able to allocate a buffer per sub-stream.
/// Implements `PartialEq`, `Eq` and `Hash` to enable use as a `HashMap` key.
///
/// A missing field and a field holding `null` are different discriminants.
#[derive(Debug, Clone)]
pub struct Discriminant {
    values: Vec<Option<Value>>,
}

impl Discriminant {
    /// Create a new Discriminant from the `LogEvent` and an ordered slice of
    /// fields to include into a discriminant value.
    pub fn from_log_event(event: &LogEvent, discriminant_fields: &[impl AsRef<str>]) -> Self {
        let values: Vec<Option<Value>> = discriminant_fields
            .iter()
            .map(|discriminant_field| event.get(discriminant_field.as_ref()).cloned())
            .collect();
        Self { values }
    }
}

impl PartialEq for Discriminant {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(this, other)| this == other)
    }
}

impl Eq for Discriminant {}

impl Hash for Discriminant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in &self.values {
            match value {
                Some(value) => {
                    state.write_u8(1);
                    hash_value(state, value);
                }
                None => state.write_u8(0),
            }
        }
    }
}

// Hashes value for discriminant purposes.
fn hash_value<H: Hasher>(hasher: &mut H, value: &Value) {
    match value {
        Value::String(val) => {
            hasher.write_u8(0);
            val.hash(hasher)
        }
        Value::Bool(val) => {
            hasher.write_u8(1);
            val.hash(hasher)
        }
        // `Number` equality is by representation, so hashing the rendered
        // form keeps `Hash` consistent with `Eq`.
        Value::Number(val) => {
            hasher.write_u8(2);
            val.to_string().hash(hasher)
        }
        Value::Array(val) => {
            hasher.write_u8(3);
            for item in val {
                hash_value(hasher, item);
            }
        }
        Value::Object(val) => {
            hasher.write_u8(4);
            for (key, item) in val {
                key.hash(hasher);
                hash_value(hasher, item);
            }
        }
        Value::Null => hasher.write_u8(5),
    }
}

impl fmt::Display for Discriminant {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i != 0 {
                write!(fmt, "-")?;
            }
            if let Some(value) = value {
                write!(fmt, "{}", super::to_string_lossy(value))?;
            } else {
                fmt.write_str("none")?;
            }
        }
        Ok(())
    }
}
