use async_trait::async_trait;
use intel_core::{FeedItem, FeedSource, IntelError};
use std::time::Duration;

/// Some feed hosts reject requests without a browser user agent.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36";

/// Production `FeedSource`: fetch a feed URL and parse RSS/Atom entries.
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpFeedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<FeedItem>, IntelError> {
        let response = self
            .client
            .get(feed_url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|e| IntelError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IntelError::ApiError(format!(
                "feed {} returned HTTP {}",
                feed_url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IntelError::ApiError(e.to_string()))?;

        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| IntelError::MalformedData(format!("unparseable feed {}: {}", feed_url, e)))?;

        // Entries without a title or link carry nothing we can store; skip them
        Ok(feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let title = entry.title.map(|t| t.content)?;
                let link = entry.links.first().map(|l| l.href.clone())?;
                Some(FeedItem {
                    title,
                    link,
                    published: entry.published,
                })
            })
            .collect())
    }
}
