use std::fmt;

use time::{Duration, OffsetDateTime};
use tracing::warn;
use url::Url;

use crate::concurrency::CancelToken;
use crate::pages::PageArchive;

/// Pages crawled more recently than this are skipped by default.
pub const DEFAULT_RECRAWL_WINDOW: Duration = Duration::hours(24);

/// Answer to "should this page be fetched now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlDecision {
    /// Fetch the page.
    Allow,
    /// Skip the page, it is fresh enough.
    CrawledToday,
    /// Abandon the whole site.
    Stop,
}

impl CrawlDecision {
    /// Human-readable explanation.
    pub fn reason(&self) -> &'static str {
        match self {
            CrawlDecision::Allow => "page is not in the archive or its copy is stale",
            CrawlDecision::CrawledToday => "page was crawled within the recrawl window",
            CrawlDecision::Stop => "crawl was stopped",
        }
    }
}

impl fmt::Display for CrawlDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Decides whether `url` should be fetched at `now`.
///
/// Cancellation wins over everything else. An archive failure also stops the
/// site, since nothing fetched afterwards could be stored.
pub fn decide_at(
    archive: &PageArchive,
    cancel: &CancelToken,
    window: Duration,
    url: &Url,
    now: OffsetDateTime,
) -> CrawlDecision {
    if cancel.is_cancelled() {
        return CrawlDecision::Stop;
    }
    match archive.max_crawled_timestamp(url.as_str()) {
        Ok(last) if now - last < window => CrawlDecision::CrawledToday,
        Ok(_) => CrawlDecision::Allow,
        Err(err) => {
            warn!(url = %url, error = %err, "crawler.decision.failed");
            CrawlDecision::Stop
        }
    }
}
