use serde::{Deserialize, Serialize};
use url::Url;

/// Commands accepted by the [`super::Supervisor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Crawl the given sites, after any crawl already queued.
    StartCrawl {
        /// Site urls.
        urls: Vec<String>,
    },
    /// Cancel and drain all running work.
    StopCrawl,
    /// Search archived content.
    StartSearch {
        /// Text to look for.
        query: String,
    },
    /// Cancel and drain all running work.
    StopSearch,
    /// Drop every stored link and start over with a fresh store.
    Reset,
    /// Stop all work and release the store.
    Shutdown,
}

impl Request {
    /// Interprets a free-form line: an absolute url requests a crawl, any
    /// other text a search. Blank lines yield `None`.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(match Url::parse(line) {
            Ok(url) if !url.cannot_be_a_base() => Request::StartCrawl {
                urls: vec![url.to_string()],
            },
            _ => Request::StartSearch {
                query: line.to_string(),
            },
        })
    }

    /// Parses a JSON encoded request, e.g. `{"type":"start_search","query":"x"}`.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Replies to [`Request`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// The crawl was queued for the accepted urls.
    CrawlQueued {
        /// Urls that will be crawled.
        accepted: Vec<String>,
        /// Entries that are not absolute urls.
        rejected: Vec<String>,
    },
    /// The search is running in the background.
    SearchStarted {
        /// Query text.
        query: String,
    },
    /// All work was cancelled and drained.
    Stopped,
    /// The store was recreated.
    Reset,
    /// The service was released.
    ShutDown,
}
