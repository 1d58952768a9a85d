use std::borrow::Cow;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::log_schema;

pub mod discriminant;

pub use discriminant::Discriminant;

pub type Value = serde_json::Value;

pub type ObjectMap = IndexMap<String, Value>;

/// A single log record.
///
/// Fields keep their insertion order so that an event serializes back out the
/// way it came in. The tag list lives under the schema's tags key as an array
/// of strings and is only created once a tag is actually added.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogEvent {
    fields: ObjectMap,
}

impl LogEvent {
    /// Build an event holding `msg` under the schema's message key.
    pub fn from_message(msg: impl Into<String>) -> Self {
        let mut log = LogEvent::default();
        log.insert(log_schema().message_key(), msg.into());
        log
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns the field as text. Strings are borrowed, everything else is
    /// rendered as JSON.
    pub fn get_str(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key).map(to_string_lossy)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    pub fn message(&self) -> Option<Cow<'_, str>> {
        self.get_str(log_schema().message_key())
    }

    /// The event's tags, in the order they were added. Non-string entries are
    /// skipped.
    pub fn tags(&self) -> Vec<&str> {
        match self.get(log_schema().tags_key()) {
            Some(Value::Array(tags)) => tags.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(tag)) => vec![tag.as_str()],
            _ => Vec::new(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().contains(&tag)
    }

    /// Appends `tag` unless it is already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        let tags_key = log_schema().tags_key();
        match self.fields.get_mut(tags_key) {
            Some(value) => {
                let tags = match value.take() {
                    Value::Array(mut tags) => {
                        if !tags.iter().any(|existing| existing.as_str() == Some(tag.as_str())) {
                            tags.push(Value::String(tag));
                        }
                        tags
                    }
                    Value::String(existing) if existing == tag => vec![Value::String(existing)],
                    Value::Null => vec![Value::String(tag)],
                    other => vec![other, Value::String(tag)],
                };
                *value = Value::Array(tags);
            }
            None => {
                self.insert(tags_key, Value::Array(vec![Value::String(tag)]));
            }
        }
    }

    /// Removes every occurrence of `tag`. The tags field itself is left in
    /// place, possibly empty.
    pub fn remove_tag(&mut self, tag: &str) {
        let tags_key = log_schema().tags_key();
        let clear = match self.fields.get_mut(tags_key) {
            Some(Value::Array(tags)) => {
                tags.retain(|existing| existing.as_str() != Some(tag));
                false
            }
            Some(Value::String(existing)) => existing.as_str() == tag,
            _ => false,
        };
        if clear {
            self.insert(tags_key, Value::Array(Vec::new()));
        }
    }
}

impl From<&str> for LogEvent {
    fn from(msg: &str) -> Self {
        Self::from_message(msg)
    }
}

impl From<String> for LogEvent {
    fn from(msg: String) -> Self {
        Self::from_message(msg)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for LogEvent {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Renders a value as text: strings verbatim, `null` as empty, everything
/// else as compact JSON.
pub fn to_string_lossy(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    }
}
