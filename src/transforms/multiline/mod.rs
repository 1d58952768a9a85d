//! Stream-aware multiline aggregation.
//!
//! Consecutive lines of one stream are folded into a single event when the
//! configured pattern says they belong together, such as the frames of a
//! stack trace following the line that raised it.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::{
    config::log_schema,
    event::LogEvent,
    internal_events::{
        MultilineEventAggregated, MultilineEventPassedThrough, MultilineOpenStreams,
        MultilineStreamsFlushed,
    },
    template::{Template, TemplateParseError},
    transforms::{FunctionTransform, OutputBuffer},
};

mod buffer;
mod logic;
mod matcher;
mod mutate;
mod patterns;

pub use self::matcher::{LineMatch, MatcherError, PatternMatcher};
pub use self::patterns::PatternError;

use self::{
    logic::{Aggregator, Emitted},
    mutate::TagFieldMutator,
};

/// Which neighbour a continuation line is merged with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum What {
    /// A continuation line belongs to the line before it.
    Previous,
    /// A continuation line is continued by the line after it.
    Next,
}

/// A single value or a list of them.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::One(one) => std::slice::from_ref(one),
            Self::Many(many) => many,
        }
    }
}

/// Fields to add, either as a table or as a flat `[key, value, ...]` list.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FieldPairs {
    Map(IndexMap<String, String>),
    List(Vec<String>),
}

impl Default for FieldPairs {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum FieldPairsError {
    #[snafu(display("add_field list must hold key/value pairs, got {} entries", len))]
    OddLength { len: usize },
}

impl FieldPairs {
    pub fn pairs(&self) -> Result<Vec<(&str, &str)>, FieldPairsError> {
        match self {
            Self::Map(map) => Ok(map.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()),
            Self::List(list) => {
                if list.len() % 2 != 0 {
                    return Err(FieldPairsError::OddLength { len: list.len() });
                }
                Ok(list
                    .chunks_exact(2)
                    .map(|pair| (pair[0].as_str(), pair[1].as_str()))
                    .collect())
            }
        }
    }
}

#[derive(Debug, Snafu)]
enum BuildError {
    #[snafu(display("Invalid pattern {:?}: {}", pattern, source))]
    InvalidPattern {
        pattern: String,
        source: MatcherError,
    },
    #[snafu(display("Invalid template {:?} in {}: {}", template, option, source))]
    InvalidTemplate {
        option: &'static str,
        template: String,
        source: TemplateParseError,
    },
    #[snafu(display("Invalid add_field: {}", source))]
    InvalidFieldPairs { source: FieldPairsError },
    #[snafu(display("stream_identity must name at least one field"))]
    EmptyStreamIdentity,
}

fn default_multiline_tag() -> String {
    "multiline".to_owned()
}

/// Configuration for the `multiline` transform.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MultilineConfig {
    /// Regular expression tested against every line. May contain
    /// `%{NAME}`, `%{NAME:field}` and `%{NAME:field:int|float}` references.
    pub pattern: String,

    /// Whether a continuation line joins the line before or after it.
    pub what: What,

    /// Treat lines that do not match `pattern` as continuation lines.
    #[serde(default)]
    pub negate: bool,

    /// The field holding the line. Defaults to the schema's message key.
    #[serde(default)]
    pub source: Option<String>,

    /// Fields whose combined values identify a stream. Defaults to the
    /// schema's host and type keys.
    #[serde(default)]
    pub stream_identity: Option<Vec<String>>,

    /// Additional named patterns usable as `%{NAME}`.
    #[serde(default)]
    pub patterns: IndexMap<String, String>,

    /// Tag added to every aggregated event. An empty string disables it.
    #[serde(default = "default_multiline_tag")]
    pub multiline_tag: String,

    /// Tags added to aggregated events.
    #[serde(default)]
    pub add_tag: OneOrMany<String>,

    /// Tags removed from aggregated events.
    #[serde(default)]
    pub remove_tag: OneOrMany<String>,

    /// Fields added to aggregated events.
    #[serde(default)]
    pub add_field: FieldPairs,

    /// Fields removed from aggregated events.
    #[serde(default)]
    pub remove_field: OneOrMany<String>,
}

impl MultilineConfig {
    pub fn new(pattern: impl Into<String>, what: What) -> Self {
        Self {
            pattern: pattern.into(),
            what,
            negate: false,
            source: None,
            stream_identity: None,
            patterns: IndexMap::new(),
            multiline_tag: default_multiline_tag(),
            add_tag: OneOrMany::default(),
            remove_tag: OneOrMany::default(),
            add_field: FieldPairs::default(),
            remove_field: OneOrMany::default(),
        }
    }

    pub fn build(&self) -> crate::Result<Multiline> {
        let matcher = PatternMatcher::new(&self.pattern, &self.patterns, self.negate)
            .context(InvalidPatternSnafu {
                pattern: self.pattern.clone(),
            })?;

        let schema = log_schema();
        let source = self
            .source
            .clone()
            .unwrap_or_else(|| schema.message_key().to_owned());
        let stream_identity = self.stream_identity.clone().unwrap_or_else(|| {
            vec![schema.host_key().to_owned(), schema.type_key().to_owned()]
        });
        if stream_identity.is_empty() {
            return Err(BuildError::EmptyStreamIdentity.into());
        }

        let add_field = self
            .add_field
            .pairs()
            .context(InvalidFieldPairsSnafu)?
            .into_iter()
            .map(|(key, value)| -> Result<_, BuildError> {
                Ok((template(key, "add_field")?, template(value, "add_field")?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mutator = TagFieldMutator {
            add_field,
            remove_field: templates(&self.remove_field, "remove_field")?,
            multiline_tag: (!self.multiline_tag.is_empty()).then(|| self.multiline_tag.clone()),
            add_tag: templates(&self.add_tag, "add_tag")?,
            remove_tag: templates(&self.remove_tag, "remove_tag")?,
        };

        debug!(
            message = "Built multiline transform.",
            pattern = %self.pattern,
            what = ?self.what,
            negate = self.negate,
            source = %source,
            stream_identity = ?stream_identity,
        );

        Ok(Multiline {
            aggregator: Arc::new(Aggregator::new(matcher, self.what, source, stream_identity)),
            mutator: Arc::new(mutator),
        })
    }
}

fn template(src: &str, option: &'static str) -> Result<Template, BuildError> {
    Template::try_from(src).context(InvalidTemplateSnafu {
        option,
        template: src,
    })
}

fn templates(
    values: &OneOrMany<String>,
    option: &'static str,
) -> Result<Vec<Template>, BuildError> {
    values
        .as_slice()
        .iter()
        .map(|src| template(src, option))
        .collect()
}

/// A running multiline transform.
///
/// Cloning is cheap and clones share their open groups, so one handle can be
/// given to every producer feeding the same logical pipeline.
#[derive(Clone, Debug)]
pub struct Multiline {
    aggregator: Arc<Aggregator>,
    mutator: Arc<TagFieldMutator>,
}

impl Multiline {
    /// Feeds one event. Returns the event of the group this one closed, if
    /// any.
    ///
    /// Events of one stream are merged in the order their calls take the
    /// stream's lock, but the closed group is returned after that lock is
    /// released. Two threads feeding the same stream may therefore receive
    /// their closed groups out of order; keep each stream on one producer
    /// when output order matters.
    pub fn process(&self, event: LogEvent) -> Option<LogEvent> {
        let emitted = self.aggregator.process(event);
        emit!(MultilineOpenStreams {
            count: self.aggregator.open_streams(),
        });
        emitted.map(|emitted| self.finish(emitted))
    }

    /// Emits every open group and forgets it. Calling it again without new
    /// input returns nothing.
    pub fn flush(&self) -> Vec<LogEvent> {
        let events: Vec<LogEvent> = self
            .aggregator
            .flush()
            .into_iter()
            .map(|emitted| self.finish(emitted))
            .collect();
        emit!(MultilineStreamsFlushed {
            count: events.len(),
        });
        emit!(MultilineOpenStreams {
            count: self.aggregator.open_streams(),
        });
        events
    }

    /// Number of streams currently holding an open group.
    pub fn open_streams(&self) -> usize {
        self.aggregator.open_streams()
    }

    fn finish(&self, emitted: Emitted) -> LogEvent {
        let Emitted { stream, finished } = emitted;
        let mut event = finished.event;
        if finished.dirty {
            emit!(MultilineEventAggregated {
                stream: &stream,
                lines: finished.lines,
            });
            self.mutator.apply(&mut event);
        } else {
            emit!(MultilineEventPassedThrough { stream: &stream });
        }
        event
    }
}

impl FunctionTransform for Multiline {
    fn transform(&mut self, output: &mut OutputBuffer, event: LogEvent) {
        if let Some(event) = self.process(event) {
            output.push(event);
        }
    }
}

#[cfg(test)]
mod tests;
