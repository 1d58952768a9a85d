use std::{
    collections::HashMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::transforms::multiline::MultilineConfig;

pub mod format;
mod log_schema;
mod vars;

pub use format::{Format, FormatHint};
pub use log_schema::{init_log_schema, log_schema, LogSchema};
pub use vars::interpolate;

/// The full contents of a configuration file.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub log_schema: LogSchema,

    pub multiline: MultilineConfig,
}

/// Represents the path of a configuration file.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct ConfigPath {
    pub path: PathBuf,
    pub format: FormatHint,
}

impl ConfigPath {
    pub fn new(path: impl Into<PathBuf>, format: FormatHint) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// The explicit format if one was given, else the one the extension
    /// implies, else TOML.
    pub fn format(&self) -> Format {
        self.format
            .or_else(|| Format::from_path(&self.path).ok())
            .unwrap_or_default()
    }
}

/// Reads the whole input and substitutes environment variables.
pub fn prepare_input<R: Read>(mut input: R) -> Result<String, Vec<String>> {
    let mut source_string = String::new();
    input
        .read_to_string(&mut source_string)
        .map_err(|e| vec![e.to_string()])?;

    let mut vars = std::env::vars().collect::<HashMap<_, _>>();
    if !vars.contains_key("HOSTNAME") {
        if let Ok(hostname) = crate::get_hostname() {
            vars.insert("HOSTNAME".into(), hostname);
        }
    }
    interpolate(&source_string, &vars)
}

pub fn load<R: Read>(input: R, format: Format) -> Result<Config, Vec<String>> {
    let with_vars = prepare_input(input)?;

    load_from_str(&with_vars, format)
}

/// Deserializes an already interpolated config.
pub fn load_from_str(input: &str, format: Format) -> Result<Config, Vec<String>> {
    let config: Config = format::deserialize(input, format)?;
    config.log_schema.validate()?;
    Ok(config)
}

pub fn load_from_path(config_path: &ConfigPath) -> Result<Config, Vec<String>> {
    let file = open_file(&config_path.path)?;
    debug!(message = "Loading config.", path = ?config_path.path, format = %config_path.format());
    load(file, config_path.format())
        .map_err(|errors| prefix_errors(&config_path.path, errors))
}

fn open_file(path: &Path) -> Result<File, Vec<String>> {
    File::open(path).map_err(|error| {
        if let std::io::ErrorKind::NotFound = error.kind() {
            vec![format!("Config file not found in path: {:?}", path)]
        } else {
            vec![format!("Error opening config file {:?}: {}", path, error)]
        }
    })
}

fn prefix_errors(path: &Path, errors: Vec<String>) -> Vec<String> {
    errors
        .into_iter()
        .map(|error| format!("{}: {}", path.display(), error))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;

    use super::*;
    use crate::transforms::multiline::What;

    #[test]
    fn loads_toml_with_defaults() {
        let config = load_from_str(
            indoc! {r#"
                [multiline]
                pattern = "^\\s"
                what = "previous"
            "#},
            Format::Toml,
        )
        .unwrap();

        assert_eq!(config.log_schema, LogSchema::default());
        assert_eq!(config.multiline.pattern, "^\\s");
        assert_eq!(config.multiline.what, What::Previous);
        assert!(!config.multiline.negate);
    }

    #[test]
    fn loads_yaml_from_path() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(
            indoc! {r#"
                log_schema:
                  message_key: line
                multiline:
                  pattern: "^%{NUMBER} %{TIME}"
                  negate: true
                  what: next
            "#}
            .as_bytes(),
        )
        .unwrap();

        let config = load_from_path(&ConfigPath::new(file.path(), None)).unwrap();
        assert_eq!(config.log_schema.message_key(), "line");
        assert_eq!(config.multiline.pattern, "^%{NUMBER} %{TIME}");
        assert_eq!(config.multiline.what, What::Next);
        assert!(config.multiline.negate);
    }

    #[test]
    fn invalid_what_is_a_config_error() {
        let errors = load_from_str(
            indoc! {r#"
                [multiline]
                pattern = "^\\s"
                what = "sideways"
            "#},
            Format::Toml,
        )
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("sideways"), "{}", errors[0]);
    }

    #[test]
    fn missing_file_reports_path() {
        let errors = load_from_path(&ConfigPath::new("/nonexistent/multiline.toml", None))
            .unwrap_err();
        assert!(errors[0].contains("not found"), "{}", errors[0]);
    }

    #[test]
    fn explicit_format_overrides_extension() {
        let path = ConfigPath::new("config.conf", Some(Format::Json));
        assert_eq!(path.format(), Format::Json);
        assert_eq!(ConfigPath::new("config.conf", None).format(), Format::Toml);
    }
}
