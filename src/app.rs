#![allow(missing_docs)]
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{SecondsFormat, Utc};
use exitcode::ExitCode;
use futures::StreamExt;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter},
    runtime::{self, Runtime},
    sync::mpsc,
    task::JoinSet,
};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::{
    cli::{handle_config_errors, Encoding, LogFormat, Opts, RootOpts},
    config::{self, log_schema},
    event::LogEvent,
    internal_events::{
        InputOpened, InputReadError, MultilineStarted, MultilineStopped, OutputWriteError,
    },
    trace,
    transforms::multiline::{Multiline, MultilineConfig},
};

const OUTPUT_BUFFER: usize = 1024;

/// Field holding the name of the input a line was read from.
pub const PATH_KEY: &str = "path";

pub struct Application {
    pub root_opts: RootOpts,
    pub multiline: Multiline,
}

impl Application {
    pub fn run() -> ExitCode {
        let (runtime, app) = match Self::prepare() {
            Ok(prepared) => prepared,
            Err(code) => return code,
        };

        let code = runtime.block_on(app.main());
        // A reader blocked on stdin must not keep the process alive.
        runtime.shutdown_timeout(Duration::from_millis(500));
        code
    }

    pub fn prepare() -> Result<(Runtime, Self), ExitCode> {
        let opts = Opts::get_matches().map_err(|error| {
            // Printing to stdout/err can itself fail; ignore it.
            _ = error.print();
            exitcode::USAGE
        })?;

        Self::prepare_from_opts(opts)
    }

    pub fn prepare_from_opts(opts: Opts) -> Result<(Runtime, Self), ExitCode> {
        init_logging(opts.root.use_color(), opts.root.log_format, opts.log_level());

        if let Some(sub_command) = &opts.sub_command {
            return Err(sub_command.execute(&opts.root));
        }

        let multiline = load_multiline(&opts.root)?;
        let runtime = build_runtime(opts.root.threads, "multiline-worker")?;

        Ok((
            runtime,
            Self {
                root_opts: opts.root,
                multiline,
            },
        ))
    }

    pub async fn main(self) -> ExitCode {
        let Self {
            root_opts,
            multiline,
        } = self;

        let inputs = Input::from_paths(&root_opts.inputs);
        let host = match root_opts.host {
            Some(host) => host,
            None => crate::get_hostname().unwrap_or_else(|error| {
                warn!(message = "Unable to read hostname.", %error);
                String::new()
            }),
        };
        let options = RunOptions {
            host,
            input_type: root_opts.input_type,
            encoding: root_opts.encoding,
        };

        run(multiline, inputs, options, tokio::io::stdout()).await
    }
}

/// Where lines are read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Stdin,
    File(PathBuf),
}

impl Input {
    pub fn from_path(path: &Path) -> Self {
        if path == Path::new("-") {
            Self::Stdin
        } else {
            Self::File(path.to_path_buf())
        }
    }

    /// All given paths, or stdin alone when there are none.
    pub fn from_paths(paths: &[PathBuf]) -> Vec<Self> {
        if paths.is_empty() {
            vec![Self::Stdin]
        } else {
            paths.iter().map(|path| Self::from_path(path)).collect()
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Stdin => "stdin".to_owned(),
            Self::File(path) => path.display().to_string(),
        }
    }

    const fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Stdin => None,
            Self::File(path) => Some(path),
        }
    }

    async fn open(&self) -> io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        Ok(match self {
            Self::Stdin => Box::new(tokio::io::stdin()),
            Self::File(path) => Box::new(tokio::fs::File::open(path).await?),
        })
    }
}

/// How read lines are turned into events and how emitted events are written.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub host: String,
    /// Overrides the type field, which otherwise names the input.
    pub input_type: Option<String>,
    pub encoding: Encoding,
}

/// Reads every input on a task of its own, feeds the lines through
/// `multiline` and writes emitted events to `output`. Open groups are
/// flushed once all inputs are exhausted or on Ctrl-C.
///
/// Lines of different inputs only stay apart if `multiline` keys streams by
/// [`PATH_KEY`], see [`build_for_inputs`].
pub async fn run<W>(multiline: Multiline, inputs: Vec<Input>, options: RunOptions, output: W) -> ExitCode
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let names: Vec<String> = inputs.iter().map(Input::name).collect();
    emit!(MultilineStarted { inputs: &names });

    let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
    let writer = tokio::spawn(write_events(rx, output, options.encoding));

    let mut readers = JoinSet::new();
    for input in inputs {
        let multiline = multiline.clone();
        let tx = tx.clone();
        let input_type = options.input_type.clone().unwrap_or_else(|| input.name());
        let host = options.host.clone();
        readers.spawn(async move {
            let path = input.name();
            let origin = Origin {
                host: &host,
                path: &path,
                input_type: &input_type,
            };
            match read_input(&input, origin, &multiline, &tx).await {
                Ok(()) => true,
                Err(error) => {
                    emit!(InputReadError {
                        name: &path,
                        path: input.path().map(PathBuf::as_path),
                        error,
                    });
                    false
                }
            }
        });
    }

    let mut code = exitcode::OK;
    let interrupted = tokio::select! {
        failed = join_readers(&mut readers) => {
            if failed {
                code = exitcode::IOERR;
            }
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        info!(message = "Interrupted, flushing open groups.");
        readers.abort_all();
    }

    for event in multiline.flush() {
        if tx.send(event).await.is_err() {
            break;
        }
    }
    drop(tx);

    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            emit!(OutputWriteError { error });
            code = exitcode::IOERR;
        }
        Err(error) => {
            error!(message = "Writer task failed.", %error);
            code = exitcode::SOFTWARE;
        }
    }

    emit!(MultilineStopped);
    code
}

// Waits for every reader. Returns whether any of them failed.
async fn join_readers(readers: &mut JoinSet<bool>) -> bool {
    let mut failed = false;
    while let Some(result) = readers.join_next().await {
        match result {
            Ok(ok) => failed |= !ok,
            Err(error) => {
                error!(message = "Reader task failed.", %error);
                failed = true;
            }
        }
    }
    failed
}

/// Where a line came from. Stamped onto every event read.
#[derive(Clone, Copy, Debug)]
pub struct Origin<'a> {
    pub host: &'a str,
    pub path: &'a str,
    pub input_type: &'a str,
}

async fn read_input(
    input: &Input,
    origin: Origin<'_>,
    multiline: &Multiline,
    tx: &mpsc::Sender<LogEvent>,
) -> io::Result<()> {
    let reader = input.open().await?;
    emit!(InputOpened { name: origin.path });

    let mut lines = FramedRead::new(reader, LinesCodec::new());
    while let Some(line) = lines.next().await {
        let line = line.map_err(|error| match error {
            LinesCodecError::Io(error) => error,
            LinesCodecError::MaxLineLengthExceeded => {
                io::Error::new(io::ErrorKind::InvalidData, "line too long")
            }
        })?;

        if let Some(event) = multiline.process(line_event(line, origin)) {
            if tx.send(event).await.is_err() {
                // The writer is gone, nothing more can be delivered.
                break;
            }
        }
    }

    Ok(())
}

/// Wraps a raw line in an event carrying the schema's message, host, type
/// and timestamp fields plus the input path.
pub fn line_event(line: String, origin: Origin<'_>) -> LogEvent {
    let schema = log_schema();
    let mut event = LogEvent::from_message(line);
    event.insert(schema.host_key(), origin.host);
    event.insert(PATH_KEY, origin.path);
    event.insert(schema.type_key(), origin.input_type);
    event.insert(
        schema.timestamp_key(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    );
    event
}

async fn write_events<W>(
    mut rx: mpsc::Receiver<LogEvent>,
    output: W,
    encoding: Encoding,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut output = BufWriter::new(output);
    while let Some(event) = rx.recv().await {
        let mut line = encode(&event, encoding)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        // Keep the output line-buffered for interactive use.
        if rx.is_empty() {
            output.flush().await?;
        }
    }
    output.flush().await
}

pub fn encode(event: &LogEvent, encoding: Encoding) -> io::Result<String> {
    match encoding {
        Encoding::Json => serde_json::to_string(event).map_err(io::Error::other),
        Encoding::Text => Ok(event.message().unwrap_or_default().into_owned()),
    }
}

/// Loads the configuration, installs its log schema and builds the transform.
pub fn load_multiline(opts: &RootOpts) -> Result<Multiline, ExitCode> {
    let Some(config_path) = opts.config_path_with_format() else {
        error!(message = "No configuration file given. Use --config.");
        return Err(exitcode::USAGE);
    };

    let config = config::load_from_path(&config_path).map_err(handle_config_errors)?;
    config::init_log_schema(config.log_schema.clone(), true);

    build_for_inputs(config.multiline)
        .map_err(|error| handle_config_errors(vec![error.to_string()]))
}

/// Builds the transform for reading inputs. Every input is its own producer,
/// so unless the config names the identity fields itself, streams are keyed
/// by host, path and type.
pub fn build_for_inputs(mut config: MultilineConfig) -> crate::Result<Multiline> {
    config.stream_identity.get_or_insert_with(|| {
        let schema = log_schema();
        vec![
            schema.host_key().to_owned(),
            PATH_KEY.to_owned(),
            schema.type_key().to_owned(),
        ]
    });
    config.build()
}

pub fn validate(opts: &RootOpts) -> ExitCode {
    match load_multiline(opts) {
        Ok(_) => {
            info!(message = "Configuration is valid.", path = ?opts.config_path);
            exitcode::OK
        }
        Err(code) => code,
    }
}

fn get_log_levels(default: &str) -> String {
    std::env::var("MULTILINE_LOG").unwrap_or_else(|_| default.into())
}

pub fn build_runtime(threads: Option<usize>, thread_name: &str) -> Result<Runtime, ExitCode> {
    let mut rt_builder = runtime::Builder::new_multi_thread();
    rt_builder.enable_all().thread_name(thread_name);

    if let Some(threads) = threads {
        if threads == 0 {
            error!("The `threads` argument must be greater or equal to 1.");
            return Err(exitcode::CONFIG);
        }
        rt_builder.worker_threads(threads);
    }

    debug!(message = "Building runtime.", worker_threads = ?threads);
    rt_builder.build().map_err(|error| {
        error!(message = "Unable to create async runtime.", %error);
        exitcode::OSERR
    })
}

pub fn init_logging(color: bool, format: LogFormat, log_level: &str) {
    let level = get_log_levels(log_level);
    let json = match format {
        LogFormat::Text => false,
        LogFormat::Json => true,
    };

    trace::init(color, json, &level);
    info!(message = "Log level is enabled.", level = ?level);
}
