use std::sync::{LazyLock, OnceLock};

use serde::{Deserialize, Serialize};

static LOG_SCHEMA: OnceLock<LogSchema> = OnceLock::new();
static LOG_SCHEMA_DEFAULT: LazyLock<LogSchema> = LazyLock::new(LogSchema::default);

const MESSAGE: &str = "message";
const TIMESTAMP: &str = "timestamp";
const HOST: &str = "host";
const TYPE: &str = "type";
const TAGS: &str = "tags";

/// Loads Log Schema from configurations and sets global schema. Once this is
/// done, configurations can be correctly loaded using configured log schema
/// defaults.
///
/// # Panics
///
/// If deny is set, will panic if schema has already been set.
pub fn init_log_schema(log_schema: LogSchema, deny_if_set: bool) {
    assert!(
        !(LOG_SCHEMA.set(log_schema).is_err() && deny_if_set),
        "Couldn't set schema"
    );
}

/// Components should use global `LogSchema` returned by this function.  The
/// returned value can differ from `LogSchema::default()` which is unchanging.
pub fn log_schema() -> &'static LogSchema {
    LOG_SCHEMA.get().unwrap_or(&LOG_SCHEMA_DEFAULT)
}

/// Log schema.
///
/// The field names every component agrees on when it needs to find the raw
/// line, the origin of an event, or its tag list.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogSchema {
    /// The name of the event field to treat as the event message.
    ///
    /// This would be the field that holds the raw message, such as a raw log line.
    message_key: String,

    /// The name of the event field to treat as the event timestamp.
    timestamp_key: String,

    /// The name of the event field to treat as the host which sent the message.
    host_key: String,

    /// The name of the event field holding the kind of input the event came from.
    ///
    /// Together with the host this identifies a logical stream.
    type_key: String,

    /// The name of the event field holding the event's tags.
    tags_key: String,
}

impl Default for LogSchema {
    fn default() -> Self {
        LogSchema {
            message_key: MESSAGE.to_string(),
            timestamp_key: TIMESTAMP.to_string(),
            host_key: HOST.to_string(),
            type_key: TYPE.to_string(),
            tags_key: TAGS.to_string(),
        }
    }
}

impl LogSchema {
    pub fn message_key(&self) -> &str {
        &self.message_key
    }

    pub fn timestamp_key(&self) -> &str {
        &self.timestamp_key
    }

    pub fn host_key(&self) -> &str {
        &self.host_key
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    pub fn tags_key(&self) -> &str {
        &self.tags_key
    }

    /// Rejects empty key names.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let errors: Vec<String> = [
            ("message_key", &self.message_key),
            ("timestamp_key", &self.timestamp_key),
            ("host_key", &self.host_key),
            ("type_key", &self.type_key),
            ("tags_key", &self.tags_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| format!("log_schema.{name} must not be empty"))
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
