//! Tracing setup. Logs always go to stderr; stdout carries the tool protocol.

use crate::app::config::AppConfig;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, trace, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "PTH_LOG";
pub const DEBUG_ENV: &str = "PTH_DEBUG";
pub const LOG_FILE_ENV: &str = "PTH_LOG_FILE";

/// Filter directive: `PTH_LOG` wins, then `PTH_DEBUG=1`, then verbosity.
pub fn filter_directive<F>(config: &AppConfig, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(directive) = lookup(LOG_ENV).filter(|d| !d.trim().is_empty()) {
        return directive;
    }
    if lookup(DEBUG_ENV).is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
        return "debug".to_string();
    }
    config.log_level().to_string()
}

pub fn init_logging(config: &AppConfig) {
    let directive = filter_directive(config, |key| std::env::var(key).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.verbose >= 2)
        .with_line_number(config.verbose >= 3)
        .with_ansi(false);

    let log_file = std::env::var(LOG_FILE_ENV).ok().map(PathBuf::from);
    let opened = log_file
        .as_ref()
        .map(|path| OpenOptions::new().create(true).append(true).open(path));

    match opened {
        Some(Ok(file)) => builder
            .with_writer(std::io::stderr.and(Mutex::new(file)))
            .init(),
        Some(Err(e)) => {
            builder.with_writer(std::io::stderr).init();
            warn!("Could not open log file {:?}: {}", log_file, e);
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    debug!("pth started with verbosity level: {}", config.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}
