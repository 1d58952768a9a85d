use indexmap::IndexMap;
use regex::Regex;
use snafu::{ResultExt, Snafu};

use super::patterns::{self, Capture, CaptureKind, PatternError, GROUP_PREFIX};
use crate::event::{ObjectMap, Value};

#[derive(Debug, Snafu)]
pub enum MatcherError {
    #[snafu(display("{}", source))]
    Expand { source: PatternError },
    #[snafu(display("Expanded pattern {:?} is not a valid regex: {}", regex, source))]
    Compile { regex: String, source: regex::Error },
}

/// The outcome of testing one line.
#[derive(Debug, Default, PartialEq)]
pub struct LineMatch {
    /// Whether the line belongs to the group of its neighbour, with `negate`
    /// already applied.
    pub continuation: bool,
    /// Named captures of the underlying match. Empty whenever the regex
    /// itself did not match, whatever `negate` says.
    pub captures: ObjectMap,
}

#[derive(Clone, Debug)]
pub struct PatternMatcher {
    regex: Regex,
    captures: Vec<Capture>,
    negate: bool,
}

impl PatternMatcher {
    pub fn new(
        pattern: &str,
        custom: &IndexMap<String, String>,
        negate: bool,
    ) -> Result<Self, MatcherError> {
        let expanded = patterns::expand(pattern, custom).context(ExpandSnafu)?;
        let regex = Regex::new(&expanded.regex).context(CompileSnafu {
            regex: expanded.regex.clone(),
        })?;

        // Groups written directly as `(?P<name>...)` are reported under their
        // own name.
        let mut captures = expanded.captures;
        captures.extend(
            regex
                .capture_names()
                .flatten()
                .filter(|name| !name.starts_with(GROUP_PREFIX))
                .map(|name| Capture {
                    group: name.to_owned(),
                    field: name.to_owned(),
                    kind: CaptureKind::String,
                }),
        );

        Ok(Self {
            regex,
            captures,
            negate,
        })
    }

    pub fn matches(&self, line: &str) -> LineMatch {
        let Some(found) = self.regex.captures(line) else {
            return LineMatch {
                continuation: self.negate,
                captures: ObjectMap::new(),
            };
        };

        let mut captures = ObjectMap::with_capacity(self.captures.len());
        for capture in &self.captures {
            if let Some(text) = found.name(&capture.group) {
                captures
                    .entry(capture.field.clone())
                    .or_insert_with(|| convert(text.as_str(), capture.kind));
            }
        }

        LineMatch {
            continuation: !self.negate,
            captures,
        }
    }
}

// Text that fails to convert is kept as a string rather than dropped.
fn convert(text: &str, kind: CaptureKind) -> Value {
    match kind {
        CaptureKind::String => Value::from(text),
        CaptureKind::Integer => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(text)),
        CaptureKind::Float => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(text)),
    }
}
