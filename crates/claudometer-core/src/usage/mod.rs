//! Usage monitoring: fetch and decode claude.ai usage data.
//!
//! The fetcher calls the organization usage endpoint with a browser session
//! cookie and classifies every failure into a [`FetchError`] variant.

pub mod error;
pub mod fetcher;
pub mod types;

pub use error::FetchError;
pub use fetcher::{ClaudeUsageClient, FetchFuture, UsageFetcher};
pub use types::{Period, PeriodUsage, UsageSnapshot};
