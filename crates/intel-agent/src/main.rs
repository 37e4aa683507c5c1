use std::sync::Arc;
use std::time::Duration;

use analysis_worker::{AnalysisWorker, ContextAssembler, SynthesisInvoker};
use anyhow::Result;
use entity_resolver::{CompanyDirectory, EntityResolver};
use event_bus::{EventBus, EventEnvelope, RedisEventBus};
use fact_store::FactStore;
use fmp_client::FmpClient;
use futures_util::StreamExt;
use model_client::GeminiClient;
use source_pollers::{
    FilingPoller, FinancialsPoller, HttpFeedSource, NewsPoller, PricePoller, RatingsPoller,
};
use tokio::signal::unix::SignalKind;
use tokio::sync::Semaphore;
use tokio::time;

mod config;

use config::AgentConfig;

/// Concurrent analysis deliveries in flight
const WORKER_CONCURRENCY: usize = 4;

const BACKFILL_LOOKBACK_DAYS: i64 = 5 * 365;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    tracing::info!("Starting MarketBrief intelligence agent");

    // 2. Load configuration; missing values are fatal here
    let config = AgentConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Tracked tickers: {}", config.tracked_tickers.len());
    tracing::info!("  News feeds: {}", config.feeds.len());
    tracing::info!(
        "  News interval: {}s | Market interval: {}s",
        config.news_poll_interval_secs,
        config.market_poll_interval_secs
    );
    tracing::info!("  Analysis topic: {}", config.analysis_topic);

    // 3. Fact store (fatal when unreachable)
    let store = FactStore::connect(&config.database_url).await?;
    sqlx::query("SELECT 1")
        .execute(store.pool())
        .await
        .map_err(|e| anyhow::anyhow!("Database connectivity check failed: {}", e))?;
    tracing::info!("Startup check: database OK");

    // 4. Company directory (fatal when unreadable)
    let directory = CompanyDirectory::load(&config.company_map_path)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    tracing::info!("Company directory loaded ({} entries)", directory.len());

    // 5. Clients
    let gemini = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        Duration::from_secs(config.model_timeout_secs),
    ));
    let fmp = Arc::new(FmpClient::new(config.fmp_api_key.clone()));

    // 6. Message bus (fatal when unreachable)
    let bus = Arc::new(RedisEventBus::connect(&config.redis_url, &config.analysis_topic).await?);
    let publish_bus: Arc<dyn EventBus> = bus.clone();
    tracing::info!("Startup check: message bus OK");

    // 7. Pipeline components
    let resolver = Arc::new(EntityResolver::new(directory, gemini.clone()));
    let worker = Arc::new(AnalysisWorker::new(
        store.clone(),
        ContextAssembler::new(store.clone()),
        SynthesisInvoker::new(gemini.clone()),
    ));

    let news_poller = NewsPoller::new(
        config.feeds.clone(),
        Arc::new(HttpFeedSource::new()),
        store.clone(),
        resolver,
        publish_bus.clone(),
    );
    let price_poller = PricePoller::new(fmp.clone(), store.clone(), config.tracked_tickers.clone());
    let financials_poller =
        FinancialsPoller::new(fmp.clone(), store.clone(), config.tracked_tickers.clone());
    let filing_poller = FilingPoller::new(
        fmp.clone(),
        store.clone(),
        publish_bus.clone(),
        config.tracked_tickers.clone(),
    );
    let ratings_poller = RatingsPoller::new(fmp, store.clone(), config.tracked_tickers.clone());

    // 8. One-shot modes
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--reset") {
        if std::env::var("RESET_CONFIRM").map(|v| v == "yes").unwrap_or(false) {
            store.reset_all().await?;
            tracing::info!("Fact store reset complete");
        } else {
            anyhow::bail!("--reset requires RESET_CONFIRM=yes");
        }
        return Ok(());
    }
    if args.iter().any(|a| a == "--backfill") {
        tracing::info!("Running one-shot backfill ({} days)", BACKFILL_LOOKBACK_DAYS);
        let written = price_poller.poll(BACKFILL_LOOKBACK_DAYS).await?;
        let quarters = financials_poller.poll().await?;
        let filings = filing_poller.poll().await?;
        tracing::info!(
            "Backfill complete: {} prices, {} statement quarters, {} filings",
            written,
            quarters,
            filings
        );
        return Ok(());
    }

    // 9. Analysis consumer: one task per delivery, bounded concurrency.
    // Duplicate deliveries are harmless; the report write dedups.
    let semaphore = Arc::new(Semaphore::new(WORKER_CONCURRENCY));
    let consumer_bus = bus.clone();
    let consumer_worker = worker.clone();
    let consumer = tokio::spawn(async move {
        let stream = match consumer_bus.subscribe().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Cannot subscribe to analysis topic: {}", e);
                return;
            }
        };
        tokio::pin!(stream);
        while let Some(envelope) = stream.next().await {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore never closed");
            let worker = consumer_worker.clone();
            tokio::spawn(async move {
                let _permit = permit;
                worker.handle(&envelope).await;
            });
        }
        tracing::warn!("Analysis topic stream ended");
    });

    tracing::info!(
        "Agent is running. News every {}s, market data every {}s. Press Ctrl+C to stop.",
        config.news_poll_interval_secs,
        config.market_poll_interval_secs
    );

    // 10. Poll loops with graceful shutdown (SIGINT + SIGTERM)
    let mut news_interval = time::interval(Duration::from_secs(config.news_poll_interval_secs));
    let mut market_interval =
        time::interval(Duration::from_secs(config.market_poll_interval_secs));
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = news_interval.tick() => {
                if let Err(e) = news_poller.poll().await {
                    tracing::error!("News pass failed: {}", e);
                }
            }
            _ = market_interval.tick() => {
                run_market_pass(
                    &config,
                    &price_poller,
                    &financials_poller,
                    &filing_poller,
                    &ratings_poller,
                    publish_bus.as_ref(),
                )
                .await;
            }
            _ = &mut shutdown => break,
        }
    }

    consumer.abort();
    tracing::info!("Agent stopped");
    Ok(())
}

/// One market-data pass: prices, financials, filings, ratings, and the
/// optional scheduled review events. Each stage logs and continues; a failed
/// stage never blocks the others.
async fn run_market_pass(
    config: &AgentConfig,
    price_poller: &PricePoller,
    financials_poller: &FinancialsPoller,
    filing_poller: &FilingPoller,
    ratings_poller: &RatingsPoller,
    bus: &dyn EventBus,
) {
    if let Err(e) = price_poller.poll(config.price_lookback_days).await {
        tracing::error!("Price pass failed: {}", e);
    }
    if let Err(e) = financials_poller.poll().await {
        tracing::error!("Financials pass failed: {}", e);
    }
    if let Err(e) = filing_poller.poll().await {
        tracing::error!("Filing pass failed: {}", e);
    }
    if let Err(e) = ratings_poller.poll().await {
        tracing::error!("Ratings pass failed: {}", e);
    }

    if config.scheduled_reviews {
        let as_of = chrono::Utc::now();
        for ticker in &config.tracked_tickers {
            let envelope = EventEnvelope::scheduled(ticker.clone(), as_of);
            if let Err(e) = bus.publish(&envelope).await {
                tracing::warn!("{}: scheduled review not published: {}", ticker, e);
            }
        }
        tracing::info!(
            "Scheduled review events published for {} tickers",
            config.tracked_tickers.len()
        );
    }
}
