//! Expansion of `%{NAME}` pattern references into plain regular expressions.
//!
//! A reference takes one of three forms:
//!
//! * `%{NAME}` inlines the definition of `NAME` as a non-capturing group.
//! * `%{NAME:field}` inlines it as a capture stored under `field`.
//! * `%{NAME:field:int}` / `%{NAME:field:float}` additionally converts the
//!   captured text.
//!
//! Definitions may reference other definitions. User supplied definitions
//! shadow the built-in ones.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use snafu::Snafu;

/// Prefix of the internal group names generated for `%{NAME:field}`
/// references. Field names are free-form but regex group names are not, so
/// captures are renamed on the way in and mapped back after matching.
pub(super) const GROUP_PREFIX: &str = "__multiline_capture_";

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%\{(?P<name>[A-Za-z0-9_]+)(?::(?P<field>[^}:]+)(?::(?P<kind>[^}]*))?)?\}")
        .expect("reference regex is valid")
});

static BUILTIN: &[(&str, &str)] = &[
    ("INT", r"(?:[+-]?(?:[0-9]+))"),
    ("BASE10NUM", r"(?:[+-]?(?:[0-9]+(?:\.[0-9]+)?|\.[0-9]+))"),
    ("NUMBER", r"(?:%{BASE10NUM})"),
    ("POSINT", r"\b(?:[1-9][0-9]*)\b"),
    ("NONNEGINT", r"\b(?:[0-9]+)\b"),
    ("WORD", r"\b\w+\b"),
    ("NOTSPACE", r"\S+"),
    ("SPACE", r"\s*"),
    ("DATA", r".*?"),
    ("GREEDYDATA", r".*"),
    ("QUOTEDSTRING", r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#),
    ("UUID", r"[A-Fa-f0-9]{8}-(?:[A-Fa-f0-9]{4}-){3}[A-Fa-f0-9]{12}"),
    (
        "IPV4",
        r"(?:(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])",
    ),
    ("IPV6", r"(?:[0-9A-Fa-f]{1,4}:){7}[0-9A-Fa-f]{1,4}|(?:[0-9A-Fa-f]{1,4}:){0,7}:(?::?[0-9A-Fa-f]{1,4}){0,7}"),
    ("IP", r"(?:%{IPV4}|%{IPV6})"),
    (
        "HOSTNAME",
        r"\b(?:[0-9A-Za-z][0-9A-Za-z-]{0,62})(?:\.(?:[0-9A-Za-z][0-9A-Za-z-]{0,62}))*\.?",
    ),
    ("HOUR", r"(?:2[0123]|[01]?[0-9])"),
    ("MINUTE", r"(?:[0-5][0-9])"),
    ("SECOND", r"(?:(?:[0-5]?[0-9]|60)(?:[:.,][0-9]+)?)"),
    ("TIME", r"%{HOUR}:%{MINUTE}(?::%{SECOND})?"),
    ("YEAR", r"(?:\d\d){1,2}"),
    ("MONTHNUM", r"(?:1[0-2]|0?[1-9])"),
    ("MONTHDAY", r"(?:3[01]|[12][0-9]|0?[1-9])"),
    ("DATE_US", r"%{MONTHNUM}[/-]%{MONTHDAY}[/-]%{YEAR}"),
    ("DATE_EU", r"%{MONTHDAY}[./-]%{MONTHNUM}[./-]%{YEAR}"),
    ("DATE", r"%{DATE_US}|%{DATE_EU}"),
    ("ISO8601_TIMEZONE", r"(?:Z|[+-]%{HOUR}(?::?%{MINUTE}))"),
    (
        "TIMESTAMP_ISO8601",
        r"%{YEAR}-%{MONTHNUM}-%{MONTHDAY}[T ]%{HOUR}:?%{MINUTE}(?::?%{SECOND})?%{ISO8601_TIMEZONE}?",
    ),
    (
        "LOGLEVEL",
        r"(?:[Aa]lert|ALERT|[Tt]race|TRACE|[Dd]ebug|DEBUG|[Nn]otice|NOTICE|[Ii]nfo|INFO|[Ww]arn(?:ing)?|WARN(?:ING)?|[Ee]rr(?:or)?|ERR(?:OR)?|[Cc]rit(?:ical)?|CRIT(?:ICAL)?|[Ff]atal|FATAL|[Ss]evere|SEVERE|[Ee]merg(?:ency)?|EMERG(?:ENCY)?)",
    ),
];

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum PatternError {
    #[snafu(display("Unknown pattern %{{{}}}", name))]
    UnknownPattern { name: String },
    #[snafu(display("Pattern %{{{}}} references itself: {}", name, chain.join(" -> ")))]
    RecursivePattern { name: String, chain: Vec<String> },
    #[snafu(display("Unsupported conversion {:?} for capture {:?}, expected \"int\" or \"float\"", kind, field))]
    UnsupportedConversion { field: String, kind: String },
}

/// How captured text is stored on the event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureKind {
    #[default]
    String,
    Integer,
    Float,
}

/// A `%{NAME:field}` capture and the regex group it was compiled to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capture {
    pub group: String,
    pub field: String,
    pub kind: CaptureKind,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Expanded {
    pub regex: String,
    pub captures: Vec<Capture>,
}

/// Expand every `%{...}` reference in `pattern`, looking names up in
/// `custom` first and then in the built-in table.
pub fn expand(pattern: &str, custom: &IndexMap<String, String>) -> Result<Expanded, PatternError> {
    let mut expander = Expander {
        custom,
        captures: Vec::new(),
        stack: Vec::new(),
    };
    let mut regex = String::with_capacity(pattern.len());
    expander.expand_into(pattern, &mut regex)?;

    Ok(Expanded {
        regex,
        captures: expander.captures,
    })
}

fn builtin(name: &str) -> Option<&'static str> {
    BUILTIN
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, definition)| *definition)
}

struct Expander<'a> {
    custom: &'a IndexMap<String, String>,
    captures: Vec<Capture>,
    stack: Vec<String>,
}

impl<'a> Expander<'a> {
    fn lookup(&self, name: &str) -> Option<&'a str> {
        let custom: &'a IndexMap<String, String> = self.custom;
        custom
            .get(name)
            .map(String::as_str)
            .or_else(|| builtin(name))
    }

    fn expand_into(&mut self, src: &str, out: &mut String) -> Result<(), PatternError> {
        let mut last_end = 0;
        for cap in REFERENCE.captures_iter(src) {
            let Some(all) = cap.get(0) else { continue };
            out.push_str(&src[last_end..all.start()]);
            last_end = all.end();

            let name = &cap["name"];
            let definition = self
                .lookup(name)
                .ok_or_else(|| PatternError::UnknownPattern { name: name.into() })?;
            if self.stack.iter().any(|open| open == name) {
                let mut chain = self.stack.clone();
                chain.push(name.into());
                return Err(PatternError::RecursivePattern {
                    name: name.into(),
                    chain,
                });
            }

            match cap.name("field") {
                Some(field) => {
                    let kind = match cap.name("kind").map(|kind| kind.as_str()) {
                        None => CaptureKind::String,
                        Some("int") => CaptureKind::Integer,
                        Some("float") => CaptureKind::Float,
                        Some(other) => {
                            return Err(PatternError::UnsupportedConversion {
                                field: field.as_str().into(),
                                kind: other.into(),
                            })
                        }
                    };
                    let group = format!("{GROUP_PREFIX}{}", self.captures.len());
                    out.push_str("(?P<");
                    out.push_str(&group);
                    out.push('>');
                    self.captures.push(Capture {
                        group,
                        field: field.as_str().into(),
                        kind,
                    });
                }
                None => out.push_str("(?:"),
            }

            self.stack.push(name.into());
            self.expand_into(definition, out)?;
            self.stack.pop();
            out.push(')');
        }
        out.push_str(&src[last_end..]);

        Ok(())
    }
}
