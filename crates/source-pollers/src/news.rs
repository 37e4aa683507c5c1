use crate::retry::with_retry;
use anyhow::Result;
use chrono::Utc;
use entity_resolver::EntityResolver;
use event_bus::{EventBus, EventEnvelope};
use fact_store::FactStore;
use intel_core::{Article, FeedSource};
use std::sync::Arc;
use std::time::Duration;

const FETCH_ATTEMPTS: u32 = 3;
const PUBLISH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// One configured syndication feed
#[derive(Debug, Clone)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
}

/// Counters for one polling pass
#[derive(Debug, Default, Clone, Copy)]
pub struct NewsPassStats {
    pub fetched: u64,
    pub new_articles: u64,
    pub published: u64,
}

/// Fetches configured feeds, stores novel articles, resolves each novel
/// headline and publishes an analysis event for resolved tickers only.
pub struct NewsPoller {
    feeds: Vec<FeedSpec>,
    source: Arc<dyn FeedSource>,
    store: FactStore,
    resolver: Arc<EntityResolver>,
    bus: Arc<dyn EventBus>,
}

impl NewsPoller {
    pub fn new(
        feeds: Vec<FeedSpec>,
        source: Arc<dyn FeedSource>,
        store: FactStore,
        resolver: Arc<EntityResolver>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            feeds,
            source,
            store,
            resolver,
            bus,
        }
    }

    /// One pass over every configured feed. Feed-level and item-level
    /// failures are logged and skipped; only store unavailability fails
    /// the pass.
    pub async fn poll(&self) -> Result<NewsPassStats> {
        let mut stats = NewsPassStats::default();

        for feed in &self.feeds {
            tracing::info!("Fetching news from: {}", feed.name);
            let items = match with_retry(&feed.name, FETCH_ATTEMPTS, RETRY_BASE_DELAY, || {
                self.source.fetch(&feed.url)
            })
            .await
            {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!("Skipping feed {} this pass: {}", feed.name, e);
                    continue;
                }
            };

            stats.fetched += items.len() as u64;
            for item in items {
                let article = Article {
                    source: feed.name.clone(),
                    title: item.title,
                    link: item.link,
                    published_at: item.published.unwrap_or_else(Utc::now),
                };

                // Dedup on link: re-ingestion of a known article is a no-op
                // and must not re-trigger analysis
                let created = self.store.insert_article_if_new(&article).await?;
                if !created {
                    continue;
                }
                stats.new_articles += 1;

                // Resolve only after the fact is durably committed.
                // Unresolved mentions are dropped silently: no event, no report.
                let Some(ticker) = self.resolver.resolve(&article.title).await else {
                    continue;
                };

                tracing::info!(
                    "Relevant article for {}: {:?}, publishing analysis request",
                    ticker,
                    article.title
                );
                let envelope = EventEnvelope::news(
                    ticker,
                    article.title.clone(),
                    article.link.clone(),
                    article.published_at,
                );
                match with_retry("publish", PUBLISH_ATTEMPTS, RETRY_BASE_DELAY, || {
                    self.bus.publish(&envelope)
                })
                .await
                {
                    Ok(()) => stats.published += 1,
                    // The fact is stored but never analyzed: acceptable loss
                    // at the intelligence layer, not the fact layer
                    Err(e) => tracing::warn!("Dropping analysis request for {}: {}", article.link, e),
                }
            }
        }

        tracing::info!(
            "News pass done: {} fetched, {} new, {} published",
            stats.fetched,
            stats.new_articles,
            stats.published
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use entity_resolver::CompanyDirectory;
    use event_bus::InMemoryBus;
    use intel_core::{FeedItem, IntelError, TextModel};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubFeed {
        items: Vec<FeedItem>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl FeedSource for StubFeed {
        async fn fetch(&self, _feed_url: &str) -> Result<Vec<FeedItem>, IntelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.items.clone())
        }
    }

    /// Resolves any headline containing "Acme Corp", like the real model would
    struct HeadlineModel;

    #[async_trait]
    impl TextModel for HeadlineModel {
        async fn generate(&self, prompt: &str) -> Result<String, IntelError> {
            if prompt.contains("Acme Corp beats") {
                Ok("Acme Corp".to_string())
            } else {
                Ok("N/A".to_string())
            }
        }
    }

    async fn setup_store() -> FactStore {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory SQLite");
        let store = FactStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    fn resolver() -> Arc<EntityResolver> {
        let mut entries = BTreeMap::new();
        entries.insert("ACME".to_string(), "Acme Corp".to_string());
        Arc::new(EntityResolver::new(
            CompanyDirectory::new(entries),
            Arc::new(HeadlineModel),
        ))
    }

    fn items() -> Vec<FeedItem> {
        vec![
            FeedItem {
                title: "Acme Corp beats earnings".to_string(),
                link: "https://x/1".to_string(),
                published: None,
            },
            FeedItem {
                title: "Markets drift sideways".to_string(),
                link: "https://x/2".to_string(),
                published: None,
            },
        ]
    }

    #[tokio::test]
    async fn novel_articles_are_stored_and_resolved_ones_published() {
        let store = setup_store().await;
        let (bus, mut rx) = InMemoryBus::new();
        let poller = NewsPoller::new(
            vec![FeedSpec {
                name: "Test Wire".to_string(),
                url: "https://feed.example/rss".to_string(),
            }],
            Arc::new(StubFeed {
                items: items(),
                calls: AtomicU32::new(0),
            }),
            store.clone(),
            resolver(),
            Arc::new(bus),
        );

        let stats = poller.poll().await.unwrap();
        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.new_articles, 2);
        assert_eq!(stats.published, 1);

        // Only the resolved headline produced an event
        let event = rx.recv().await.unwrap();
        assert_eq!(event.ticker, "ACME");
        assert_eq!(event.url.as_deref(), Some("https://x/1"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn second_pass_over_same_feed_publishes_nothing() {
        let store = setup_store().await;
        let (bus, mut rx) = InMemoryBus::new();
        let feed = Arc::new(StubFeed {
            items: items(),
            calls: AtomicU32::new(0),
        });
        let poller = NewsPoller::new(
            vec![FeedSpec {
                name: "Test Wire".to_string(),
                url: "https://feed.example/rss".to_string(),
            }],
            feed,
            store.clone(),
            resolver(),
            Arc::new(bus),
        );

        poller.poll().await.unwrap();
        let _ = rx.recv().await.unwrap();

        let stats = poller.poll().await.unwrap();
        assert_eq!(stats.new_articles, 0);
        assert_eq!(stats.published, 0);
        assert!(rx.try_recv().is_err());

        // Still exactly two stored articles
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(n, 2);
    }
}
