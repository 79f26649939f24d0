use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::logger::init_tracing;
use ticker::{
    config::AppConfig,
    db::Db,
    market::{MarketDataClient, QuoteCache, QuoteResolver},
    metrics::counters::Counters,
    scheduler::TickerScheduler,
    store::{SqlxTickerConfigStore, TickerConfigStore},
    surface::DiscordChannelRenamer,
};

const COUNTERS_LOG_EVERY: Duration = Duration::from_secs(300);

/// Connects, runs migrations and builds the configuration store.
async fn init_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn TickerConfigStore>> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    Ok(Arc::new(SqlxTickerConfigStore::new(
        (*db.pool).clone(),
        cfg.update_interval_ms,
    )))
}

fn build_resolver(cfg: &AppConfig, counters: Counters) -> anyhow::Result<QuoteResolver> {
    let client = MarketDataClient::new(
        &cfg.api_base,
        cfg.api_key.clone(),
        cfg.api_bearer.clone(),
        cfg.http_timeout(),
    )?;

    Ok(QuoteResolver::new(
        Arc::new(client),
        QuoteCache::new(cfg.cache_ttl()),
        counters,
    ))
}

/// Periodically logs the counters.
fn start_counters_log(counters: Counters) {
    tokio::spawn(async move {
        let mut every = tokio::time::interval(COUNTERS_LOG_EVERY);
        every.tick().await;

        loop {
            every.tick().await;
            let snap = counters.snapshot();
            tracing::info!(
                ticks = snap.ticks,
                tick_failures = snap.tick_failures,
                renames_applied = snap.renames_applied,
                renames_skipped = snap.renames_skipped,
                upstream_fetches = snap.upstream_fetches,
                cache_hits = snap.cache_hits,
                coalesced_waits = snap.coalesced_waits,
                fallbacks_used = snap.fallbacks_used,
                "ticker counters"
            );
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing("ticker", is_production);

    tracing::info!("Starting price ticker...");

    let cfg = AppConfig::from_env().context("invalid configuration")?;
    let counters = Counters::default();

    let store = init_store(&cfg).await?;
    let resolver = build_resolver(&cfg, counters.clone())?;
    let renamer = Arc::new(DiscordChannelRenamer::new(
        &cfg.discord_api_base,
        cfg.discord_token.clone(),
        cfg.http_timeout(),
    )?);

    let scheduler = TickerScheduler::new(store, resolver, renamer, counters.clone());
    let started = scheduler.bootstrap().await?;
    tracing::info!(started, "ticker surfaces scheduled");

    start_counters_log(counters);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    // Leave the ticker names in place; they are rebuilt on the next start.
    scheduler.stop_all(false).await;

    Ok(())
}
