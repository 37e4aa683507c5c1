//! source-pollers: periodically triggered ingestion units.
//!
//! Each poller is an independent pass over one external source with no
//! shared in-memory state across runs; all cross-poller coordination happens
//! through the fact store's uniqueness constraints. A failure local to one
//! item or one ticker never aborts the whole pass.

pub mod extract;
pub mod feed;
pub mod filings;
pub mod financials;
pub mod news;
pub mod prices;
pub mod ratings;
pub mod retry;

pub use feed::HttpFeedSource;
pub use filings::FilingPoller;
pub use financials::FinancialsPoller;
pub use news::{FeedSpec, NewsPoller};
pub use prices::PricePoller;
pub use ratings::RatingsPoller;
