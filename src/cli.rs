#![allow(missing_docs)]

use std::path::PathBuf;

use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};

use crate::{config, get_version};

#[derive(Parser, Debug)]
#[command(rename_all = "kebab-case")]
pub struct Opts {
    #[command(flatten)]
    pub root: RootOpts,

    #[command(subcommand)]
    pub sub_command: Option<SubCommand>,
}

impl Opts {
    pub fn get_matches() -> Result<Self, clap::Error> {
        let version = get_version();
        let app = Opts::command().version(version);
        Opts::from_arg_matches(&app.get_matches())
    }

    pub const fn log_level(&self) -> &'static str {
        let (quiet_level, verbose_level) = (self.root.quiet, self.root.verbose);

        match quiet_level {
            0 => match verbose_level {
                0 => "info",
                1 => "debug",
                2..=255 => "trace",
            },
            1 => "warn",
            2 => "error",
            3..=255 => "off",
        }
    }
}

#[derive(Parser, Debug)]
#[command(rename_all = "kebab-case")]
pub struct RootOpts {
    /// Read configuration from the given file.
    /// File format is detected from the file name unless `--config-format` is set.
    #[arg(id = "config", short, long, env = "MULTILINE_CONFIG", global = true)]
    pub config_path: Option<PathBuf>,

    /// Format of the configuration file.
    #[arg(long, env = "MULTILINE_CONFIG_FORMAT", global = true)]
    pub config_format: Option<config::Format>,

    /// Files to read lines from. Reads stdin when none is given or for `-`.
    #[arg(id = "input")]
    pub inputs: Vec<PathBuf>,

    /// Value of the host field on every line read. Defaults to the hostname.
    #[arg(long, env = "MULTILINE_HOST")]
    pub host: Option<String>,

    /// Value of the type field on every line read. Defaults to the name of
    /// the input the line came from.
    #[arg(long = "type", env = "MULTILINE_TYPE")]
    pub input_type: Option<String>,

    /// How emitted events are written to stdout.
    #[arg(long, default_value = "json", env = "MULTILINE_ENCODING")]
    pub encoding: Encoding,

    /// Number of worker threads of the runtime.
    #[arg(short, long, env = "MULTILINE_THREADS")]
    pub threads: Option<usize>,

    /// Enable more detailed internal logging. Repeat to increase level. Overridden by `--quiet`.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce detail of internal logging. Repeat to reduce further. Overrides `--verbose`.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Set the logging format
    #[arg(long, default_value = "text", env = "MULTILINE_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Control when ANSI terminal formatting is used.
    ///
    /// By default, formatting is only used when stderr is a terminal.
    #[arg(long, default_value = "auto", env = "MULTILINE_COLOR", global = true)]
    pub color: Color,
}

impl RootOpts {
    /// The config file with its format, if one was given.
    pub fn config_path_with_format(&self) -> Option<config::ConfigPath> {
        self.config_path
            .as_ref()
            .map(|path| config::ConfigPath::new(path, self.config_format))
    }

    pub fn use_color(&self) -> bool {
        match self.color {
            Color::Always => true,
            Color::Never => false,
            Color::Auto => {
                use std::io::IsTerminal;
                std::io::stderr().is_terminal()
            }
        }
    }
}

#[derive(Parser, Debug)]
#[command(rename_all = "kebab-case")]
pub enum SubCommand {
    /// Load and build the configuration, then exit without reading input.
    Validate,
}

impl SubCommand {
    pub fn execute(&self, opts: &RootOpts) -> exitcode::ExitCode {
        match self {
            Self::Validate => crate::app::validate(opts),
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Auto,
    Always,
    Never,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// One JSON object per event.
    Json,
    /// The message field only.
    Text,
}

pub fn handle_config_errors(errors: Vec<String>) -> exitcode::ExitCode {
    for error in errors {
        error!(message = "Configuration error.", %error);
    }

    exitcode::CONFIG
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn parse(args: &[&str]) -> Opts {
        Opts::try_parse_from(std::iter::once("multiline").chain(args.iter().copied())).unwrap()
    }

    #[rstest]
    #[case(&[], "info")]
    #[case(&["-v"], "debug")]
    #[case(&["-vv"], "trace")]
    #[case(&["-q"], "warn")]
    #[case(&["-qq"], "error")]
    #[case(&["-qqq", "-vvv"], "off")]
    fn log_level_follows_flags(#[case] args: &[&str], #[case] expected: &str) {
        assert_eq!(parse(args).log_level(), expected);
    }

    #[test]
    fn inputs_and_options() {
        let opts = parse(&[
            "--config",
            "multiline.yaml",
            "--type",
            "app",
            "--encoding",
            "text",
            "a.log",
            "-",
        ]);

        assert_eq!(opts.root.inputs, vec![PathBuf::from("a.log"), PathBuf::from("-")]);
        assert_eq!(opts.root.input_type.as_deref(), Some("app"));
        assert_eq!(opts.root.encoding, Encoding::Text);
        assert!(opts.sub_command.is_none());

        let path = opts.root.config_path_with_format().unwrap();
        assert_eq!(path.format(), config::Format::Yaml);
    }

    #[test]
    fn validate_takes_config_after_subcommand() {
        let opts = parse(&["validate", "--config", "multiline.conf", "--config-format", "json"]);

        assert!(matches!(opts.sub_command, Some(SubCommand::Validate)));
        let path = opts.root.config_path_with_format().unwrap();
        assert_eq!(path.path, PathBuf::from("multiline.conf"));
        assert_eq!(path.format(), config::Format::Json);
    }

    #[test]
    fn command_is_well_formed() {
        Opts::command().debug_assert();
    }
}
