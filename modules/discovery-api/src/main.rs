//! POI proxy for the Münster discovery app.
//!
//! Aggregates the Datenportal Münsterland open-data API: fetches paginated
//! POI and event collections, joins events to their owning POIs, defensively
//! re-filters against the allowed-city/allowed-type policy, normalizes the
//! heterogeneous upstream fields into one stable JSON contract, and caches
//! the merged result for two minutes.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use datenportal_client::DatenportalClient;

mod cache;
mod config;
mod normalize;
mod rest;
mod upstream;

use cache::SingleSlotCache;
use config::Config;
use rest::AppState;
use upstream::DatenportalSource;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("discovery_api=info".parse()?)
                .add_directive("datenportal_client=info".parse()?),
        )
        .init();

    let config = Config::from_env();
    let client = DatenportalClient::new(
        &config.dp_base_url,
        &config.dp_api_user,
        &config.dp_api_pass,
    );

    let state = Arc::new(AppState {
        source: Arc::new(DatenportalSource::new(client)),
        cache: SingleSlotCache::new(rest::CACHE_TTL),
        has_credentials: config.has_credentials(),
    });

    let app = rest::app(state);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Datenportal POI proxy listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
