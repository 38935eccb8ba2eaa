//! Console (stderr) and optional rolling file logging.

use std::path::Path;

use eyre::{WrapErr, eyre};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::FILE_GUARD;

/// Install the global subscriber. `RUST_LOG` wins over `cli_level`, which
/// wins over `logging.level`.
pub fn init(cfg: &lpm_config::Logging, cli_level: Option<&str>, json: bool) -> eyre::Result<()> {
    let level = cli_level.or(cfg.level.as_deref()).unwrap_or("info");
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level)
            .wrap_err_with(|| format!("invalid configuration: bad log level '{level}'"))?,
    };

    // stdout carries results; logs go to stderr.
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match cfg.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre!("invalid configuration: logging.file has no file name"))?;
            let appender = match cfg.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre!("failed to install logger: {e}"))
}
