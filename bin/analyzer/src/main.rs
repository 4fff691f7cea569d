use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{Config, Sample, Store, TradeIntent};
use feed::{FeedConfig, FeedStream};
use publisher::{AnalyzerConfig, DetectionConfig, EventBus, EventLog, LogCaps, MarketAnalyzer, Publisher};
use store::{MemoryStore, SqliteStore};
use strategy::{ActivationRegistry, StrategyFileConfig, StrategyRegistry};
use supervisor::{Backoff, Supervisor, UnitSpec};
use trader::{StorePrices, TradeEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ───────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid configuration")?;
    info!(symbols = ?cfg.symbols, interval = %cfg.kline_interval, "Market analyzer starting");

    // ── Store ────────────────────────────────────────────────────────────────
    let store: Arc<dyn Store> = match &cfg.database_url {
        Some(url) => Arc::new(
            SqliteStore::connect(url)
                .await
                .with_context(|| format!("failed to open store at {url}"))?,
        ),
        None => {
            info!("DATABASE_URL not set, keeping history in memory");
            Arc::new(MemoryStore::new())
        }
    };

    // ── Strategies ───────────────────────────────────────────────────────────
    let strategy_file = StrategyFileConfig::load_or_empty(&cfg.strategy_config_path)
        .with_context(|| format!("failed to load strategies from {}", cfg.strategy_config_path))?;
    let activation = ActivationRegistry::new();
    let registry = Arc::new(StrategyRegistry::from_config(&strategy_file, activation));

    // ── Channels ─────────────────────────────────────────────────────────────
    let (sample_tx, _) = broadcast::channel::<Sample>(cfg.bus_capacity);
    let (intent_tx, intent_rx) = mpsc::channel::<TradeIntent>(128);
    // Shared so a restarted engine unit keeps draining the same channel.
    let intent_rx = Arc::new(Mutex::new(intent_rx));

    // ── Publisher / engine ───────────────────────────────────────────────────
    let bus = EventBus::new(cfg.bus_capacity);
    let caps = LogCaps {
        prices: cfg.price_log_cap,
        depths: cfg.depth_log_cap,
        signals: cfg.event_log_cap,
        indicators: cfg.indicator_log_cap,
    };
    let publisher = Publisher::new(EventLog::new(store.clone(), caps), bus.clone());
    let analyzer_cfg = AnalyzerConfig {
        depth_band: cfg.depth_band,
        detection: DetectionConfig { candle_window: cfg.kline_interval.clone(), ..DetectionConfig::default() },
        ..AnalyzerConfig::default()
    };
    let engine = TradeEngine::new(
        store.clone(),
        Arc::new(StorePrices::new(store.clone())),
        cfg.monitor_intervals.clone(),
    );

    // ── Supervised units ─────────────────────────────────────────────────────
    let supervisor = Supervisor::new(Backoff {
        initial: Duration::from_millis(cfg.restart_backoff_ms),
        max: Duration::from_millis(cfg.restart_backoff_max_ms),
    });

    {
        let store = store.clone();
        let samples = sample_tx.clone();
        supervisor.start(UnitSpec::new("analyzer", move |token| {
            let analyzer = MarketAnalyzer::new(store.clone(), publisher.clone(), analyzer_cfg.clone());
            analyzer.run(samples.subscribe(), token)
        }));
    }

    {
        let bus = bus.clone();
        let registry = registry.clone();
        supervisor.start(UnitSpec::new("strategies", move |token| {
            let registry = registry.clone();
            let events = bus.subscribe();
            let intents = intent_tx.clone();
            async move { registry.run(events, intents, token).await }
        }));
    }

    {
        let engine = engine.clone();
        supervisor.start(UnitSpec::new("trade-engine", move |token| {
            let engine = engine.clone();
            let intents = intent_rx.clone();
            async move {
                let mut intents = intents.lock().await;
                engine.run(&mut intents, token).await
            }
        }));
    }

    let feed = Arc::new(FeedStream::new(
        FeedConfig {
            url: cfg.stream_url.clone(),
            symbols: cfg.symbols.clone(),
            interval: cfg.kline_interval.clone(),
        },
        sample_tx,
    ));
    supervisor.start(UnitSpec::new("feed", move |token| {
        let feed = feed.clone();
        async move { feed.run(token).await }
    }));

    info!(units = supervisor.managed_count(), strategies = registry.len(), "All units started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    supervisor.shutdown().await;
    let closed = engine.shutdown().await;
    info!(positions_closed = closed.len(), "Shutdown complete");
    Ok(())
}
