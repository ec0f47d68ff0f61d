use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use color_eyre::eyre::{Result, WrapErr, eyre};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const DEFAULT_FILTER: &str = "storefront=info";

/// Installs the global tracing subscriber.
///
/// The terminal is owned by the UI, so logs only go to `log_file`. Without
/// one no subscriber is installed and events are discarded. `RUST_LOG`
/// overrides the default `storefront=info` filter.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or a subscriber is already
/// installed.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("failed to open log file {}", path.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre!("failed to install tracing subscriber: {e}"))?;

    tracing::info!(path = %path.display(), "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_file_installs_nothing() {
        assert!(init(None).is_ok());
    }

    #[test]
    fn test_unopenable_file_is_an_error() {
        let dir = std::env::temp_dir().join("storefront-logging-missing-dir");
        let _ = std::fs::remove_dir_all(&dir);
        let err = init(Some(&dir.join("nested").join("app.log"))).expect_err("parent is missing");
        assert!(err.to_string().contains("failed to open log file"));
    }
}
