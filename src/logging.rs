use std::env;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber. Output goes to stderr so `--json` reports
/// on stdout stay machine-readable.
pub fn init(debug: bool) {
    let filter = EnvFilter::try_from_env("ARCHIVER_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if debug || env::var("DEBUG").is_ok() {
            "convo_archiver=debug,info"
        } else {
            "convo_archiver=info,warn"
        })
    });

    let format = env::var("ARCHIVER_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(filter);

    // A second init (tests, repeated dispatch) keeps the first subscriber.
    let _ = match format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
    };
}
