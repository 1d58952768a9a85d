#![allow(missing_docs)]

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Installs the global subscriber. Logs go to stderr so that stdout only
/// carries emitted events.
pub fn init(color: bool, json: bool, levels: &str) {
    let filter = EnvFilter::try_new(levels).unwrap_or_else(|error| {
        eprintln!("Invalid log level directive {levels:?}: {error}. Falling back to \"info\".");
        EnvFilter::new("info")
    });

    let fmt = tracing_subscriber::fmt::layer()
        .with_ansi(color)
        .with_writer(std::io::stderr);
    let fmt = if json {
        fmt.json().flatten_event(true).boxed()
    } else {
        fmt.boxed()
    };

    tracing_subscriber::registry().with(filter).with(fmt).init();
}
