use std::{collections::HashMap, sync::LazyLock};

use regex::{Captures, Regex};

// Names follow what a shell accepts (`[:word:]`) plus `.`, which shows up in
// names taken from Java properties files.
//
// `$$` is a literal dollar sign. Patterns in a config need it for end-of-line
// anchors.
static INTERPOLATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$ |
        \$(?P<bare>[[:word:].]+) |
        \$\{(?P<name>[[:word:].]+)(?:(?P<op>:?[-?])(?P<arg>[^}]*))?\}",
    )
    .unwrap()
});

/// Substitutes `$NAME`, `${NAME}`, `${NAME-default}`, `${NAME:-default}`,
/// `${NAME?error}` and `${NAME:?error}` from `vars`. With `:` an empty value
/// counts as unset. Every failed substitution is reported.
pub fn interpolate(input: &str, vars: &HashMap<String, String>) -> Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let interpolated = INTERPOLATION
        .replace_all(input, |caps: &Captures<'_>| {
            let Some(name) = caps.name("bare").or_else(|| caps.name("name")) else {
                return "$".to_owned();
            };
            let op = caps.name("op").map_or("", |m| m.as_str());
            let arg = caps.name("arg").map_or("", |m| m.as_str());
            let value = vars.get(name.as_str()).map(String::as_str);

            match substitute(name.as_str(), op, arg, value) {
                Ok(value) => value.to_owned(),
                Err(error) => {
                    errors.push(error);
                    String::new()
                }
            }
        })
        .into_owned();

    if errors.is_empty() {
        Ok(interpolated)
    } else {
        Err(errors)
    }
}

fn substitute<'a>(
    name: &str,
    op: &str,
    arg: &'a str,
    value: Option<&'a str>,
) -> Result<&'a str, String> {
    let (value, op) = match op.strip_prefix(':') {
        Some(op) => (value.filter(|value| !value.is_empty()), op),
        None => (value, op),
    };

    match (value, op) {
        (Some(value), _) => Ok(value),
        (None, "-") => Ok(arg),
        (None, "?") => Err(format!(
            "Required environment variable is unset or empty in config. name = {name:?}, error = {arg:?}"
        )),
        (None, _) => Err(format!("Missing environment variable in config. name = {name:?}")),
    }
}
