use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;

use storefront::api::{CatalogApi, HttpClient};
use storefront::app::{Storefront, StorefrontFlags};
use storefront::config::{AppConfig, Cli};
use storefront::runtime::Runtime;
use storefront::subscription::http::QueryClient;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = AppConfig::try_from(Cli::parse())?;
    storefront::logging::init(config.log_file.as_deref())?;
    info!(base_url = %config.base_url, route = %config.route, "starting storefront");

    let api: Arc<dyn CatalogApi> = Arc::new(HttpClient::new(config.base_url, config.timeout)?);
    let flags = StorefrontFlags {
        api,
        query_client: Arc::new(QueryClient::with_config(config.query)),
        route: config.route,
        reset_policy: config.reset_policy,
    };

    let mut terminal = ratatui::init();
    let result = Runtime::<Storefront>::new(flags)
        .run(&mut terminal, config.frame_rate)
        .await;
    ratatui::restore();

    result
}
