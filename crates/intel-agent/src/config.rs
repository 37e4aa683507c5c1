use anyhow::{Context, Result};
use source_pollers::FeedSpec;
use std::env;

/// Full daemon configuration, validated once at startup. Missing required
/// values are fatal here, never silently degraded later.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    // External services
    pub database_url: String,
    pub redis_url: String,
    pub fmp_api_key: String,
    pub gemini_api_key: String,

    // Message bus
    pub analysis_topic: String,

    // Entity configuration
    pub company_map_path: String,
    pub tracked_tickers: Vec<String>,

    // News feeds
    pub feeds: Vec<FeedSpec>,

    // Scheduling
    pub news_poll_interval_secs: u64,      // 900 (15 minutes)
    pub market_poll_interval_secs: u64,    // 86400 (daily)
    pub price_lookback_days: i64,          // 14
    pub scheduled_reviews: bool,           // emit SCHEDULED events per ticker

    // Model
    pub model_timeout_secs: u64,           // 45
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let tickers_path = env::var("TICKERS_PATH")
            .unwrap_or_else(|_| "config/tickers.txt".to_string());
        let tracked_tickers = load_tickers(&tickers_path)?;

        let config = Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            redis_url: env::var("REDIS_URL").context("REDIS_URL not set")?,
            fmp_api_key: env::var("FMP_API_KEY").context("FMP_API_KEY not set")?,
            gemini_api_key: env::var("GEMINI_API_KEY").context("GEMINI_API_KEY not set")?,

            analysis_topic: env::var("ANALYSIS_TOPIC")
                .unwrap_or_else(|_| "analysis-requests".to_string()),

            company_map_path: env::var("COMPANY_MAP_PATH")
                .unwrap_or_else(|_| "config/company_map.json".to_string()),
            tracked_tickers,

            feeds: parse_feeds(env::var("NEWS_FEEDS").ok().as_deref()),

            news_poll_interval_secs: env::var("NEWS_POLL_INTERVAL")
                .unwrap_or_else(|_| "900".to_string())
                .parse()?,
            market_poll_interval_secs: env::var("MARKET_POLL_INTERVAL")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()?,
            price_lookback_days: env::var("PRICE_LOOKBACK_DAYS")
                .unwrap_or_else(|_| "14".to_string())
                .parse()?,
            scheduled_reviews: env::var("SCHEDULED_REVIEWS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            model_timeout_secs: env::var("MODEL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "45".to_string())
                .parse()?,
        };

        Ok(config)
    }
}

/// The closed tracked-identifier list: one ticker per line.
fn load_tickers(path: &str) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read tracked-ticker list {}", path))?;
    let tickers: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_uppercase())
        .collect();
    if tickers.is_empty() {
        anyhow::bail!("tracked-ticker list {} is empty", path);
    }
    Ok(tickers)
}

/// Feed overrides as `Name=url;Name=url`; defaults to the standard wires.
fn parse_feeds(spec: Option<&str>) -> Vec<FeedSpec> {
    if let Some(spec) = spec {
        let feeds: Vec<FeedSpec> = spec
            .split(';')
            .filter_map(|pair| {
                let (name, url) = pair.split_once('=')?;
                let (name, url) = (name.trim(), url.trim());
                if name.is_empty() || url.is_empty() {
                    return None;
                }
                Some(FeedSpec {
                    name: name.to_string(),
                    url: url.to_string(),
                })
            })
            .collect();
        if !feeds.is_empty() {
            return feeds;
        }
        tracing::warn!("NEWS_FEEDS set but unparseable, using default feed list");
    }

    [
        ("MarketWatch Top Stories", "http://www.marketwatch.com/rss/topstories"),
        ("Seeking Alpha Market Currents", "https://seekingalpha.com/market_currents.xml"),
        ("Zacks Press Releases", "https://scr.zacks.com/distribution/rss-feeds/default.aspx"),
        ("BBC News Business", "http://feeds.bbci.co.uk/news/business/rss.xml"),
        ("CNBC Top News", "https://www.cnbc.com/id/100003114/device/rss/rss.html"),
    ]
    .into_iter()
    .map(|(name, url)| FeedSpec {
        name: name.to_string(),
        url: url.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_overrides_parse() {
        let feeds = parse_feeds(Some("Test Wire=https://a/rss; Other=https://b/rss"));
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].name, "Test Wire");
        assert_eq!(feeds[1].url, "https://b/rss");
    }

    #[test]
    fn unparseable_override_falls_back_to_defaults() {
        let feeds = parse_feeds(Some("not a feed spec"));
        assert_eq!(feeds.len(), 5);
    }

    #[test]
    fn default_feed_list_is_used_without_override() {
        let feeds = parse_feeds(None);
        assert!(feeds.iter().any(|f| f.name.contains("BBC")));
    }
}
