//! Console and log-file output.
//!
//! Every event goes to stdout and, when the run has a log directory, to
//! `train.log` / `test.log` there (plain text, no ANSI colours).

use std::fs::File;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::ConfigError;

/// What to do about an existing log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    Proceed,
    Abort,
}

/// Ask on `output` whether `path` may be overwritten; only `n`/`N` declines.
pub fn confirm_overwrite(
    path: &Path,
    mut input: impl BufRead,
    mut output: impl Write,
) -> std::io::Result<Overwrite> {
    write!(
        output,
        "log file exists in {}, are you sure you want to override it?(Y/N)",
        path.display()
    )?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    if answer.trim().eq_ignore_ascii_case("n") {
        Ok(Overwrite::Abort)
    } else {
        Ok(Overwrite::Proceed)
    }
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`), stdout,
/// and `log_file` when given.
///
/// A subscriber that is already installed (tests) is left in place.
pub fn init(log_file: Option<&Path>) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path).map_err(|source| ConfigError::LogFile {
                path: path.display().to_string(),
                source,
            })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .ok();
    Ok(())
}

/// `"{mode} {metric} at step {step}: {value:.6}"` for each entry.
pub fn log_metrics<'a, V: Into<f64> + Copy + 'a>(
    mode: &str,
    step: u64,
    metrics: impl IntoIterator<Item = &'a (&'static str, V)>,
) {
    for (name, value) in metrics {
        tracing::info!("{mode} {name} at step {step}: {:.6}", Into::<f64>::into(*value));
    }
}
