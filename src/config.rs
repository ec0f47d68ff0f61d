use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use url::Url;

use crate::form::ResetPolicy;
use crate::router::Route;
use crate::subscription::http::QueryConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "storefront")]
#[command(about = "Terminal front end for the product catalog service")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
    /// Base URL of the catalog service
    #[arg(long, env = "STOREFRONT_API_URL", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Page to open first (e.g. /products, /products/42, /login, /register)
    #[arg(long, default_value = "/products")]
    pub route: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Seconds cached reads count as fresh
    #[arg(long, default_value_t = 0)]
    pub stale_secs: u64,

    /// Seconds unused cache entries are kept
    #[arg(long, default_value_t = 300)]
    pub cache_secs: u64,

    /// Redraws per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Clear forms only after the submission succeeds
    #[arg(long)]
    pub reset_on_success: bool,

    /// Write logs to this file (the terminal belongs to the UI)
    #[arg(long, env = "STOREFRONT_LOG")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL {url:?}: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("base URL {0:?} must use http or https")]
    Scheme(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validated startup settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Always ends with `/` so request paths append to it.
    pub base_url: Url,
    pub route: Route,
    pub timeout: Duration,
    pub query: QueryConfig,
    pub frame_rate: u32,
    pub reset_policy: ResetPolicy,
    pub log_file: Option<PathBuf>,
}

impl TryFrom<Cli> for AppConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let mut base_url = Url::parse(&cli.base_url).map_err(|source| ConfigError::BaseUrl {
            url: cli.base_url.clone(),
            source,
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Scheme(cli.base_url));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        if cli.timeout_secs == 0 {
            return Err(ConfigError::Zero("--timeout-secs"));
        }
        if cli.fps == 0 {
            return Err(ConfigError::Zero("--fps"));
        }

        let reset_policy = if cli.reset_on_success {
            ResetPolicy::OnSuccess
        } else {
            ResetPolicy::OnSubmit
        };

        Ok(Self {
            base_url,
            route: Route::parse(&cli.route),
            timeout: Duration::from_secs(cli.timeout_secs),
            query: QueryConfig::new(
                Duration::from_secs(cli.stale_secs),
                Duration::from_secs(cli.cache_secs),
            ),
            frame_rate: cli.fps,
            reset_policy,
            log_file: cli.log_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<AppConfig, ConfigError> {
        let cli = Cli::try_parse_from(std::iter::once("storefront").chain(args.iter().copied()))
            .expect("arguments parse");
        AppConfig::try_from(cli)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--base-url", "http://localhost:8000"]).expect("valid config");
        assert_eq!(config.base_url.as_str(), "http://localhost:8000/");
        assert_eq!(config.route, Route::Products);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.query, QueryConfig::default());
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.reset_policy, ResetPolicy::OnSubmit);
    }

    #[test]
    fn test_base_path_gets_trailing_slash() {
        let config = parse(&["--base-url", "https://shop.example.com/api"]).expect("valid config");
        assert_eq!(config.base_url.as_str(), "https://shop.example.com/api/");
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = parse(&[
            "--base-url",
            "http://localhost:8000",
            "--route",
            "/products/7",
            "--stale-secs",
            "30",
            "--reset-on-success",
        ])
        .expect("valid config");
        assert_eq!(config.route, Route::Product(Some("7".to_string())));
        assert_eq!(config.query.stale_time, Duration::from_secs(30));
        assert_eq!(config.reset_policy, ResetPolicy::OnSuccess);
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(matches!(
            parse(&["--base-url", "not a url"]),
            Err(ConfigError::BaseUrl { .. })
        ));
        assert!(matches!(
            parse(&["--base-url", "ftp://files.example.com"]),
            Err(ConfigError::Scheme(_))
        ));
    }

    #[test]
    fn test_rejects_zero_fps() {
        assert!(matches!(
            parse(&["--base-url", "http://localhost:8000", "--fps", "0"]),
            Err(ConfigError::Zero("--fps"))
        ));
    }
}
