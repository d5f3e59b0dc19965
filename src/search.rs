//! Text search over archived page content.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::pages::PageArchive;
use crate::types::{LinkId, Result};

/// One page whose content contains the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// Page record id.
    pub page_id: LinkId,
    /// Page uri.
    pub uri: String,
}

/// Summary passed to the completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchSummary {
    /// Query text.
    pub query: String,
    /// Number of hits delivered.
    pub results: usize,
    /// Wall time spent searching.
    pub elapsed: Duration,
}

/// Resolves text queries to page hits.
#[derive(Clone)]
pub struct SearchEngine {
    archive: PageArchive,
}

impl SearchEngine {
    /// Creates an engine over `archive`.
    pub fn new(archive: PageArchive) -> Self {
        Self { archive }
    }

    /// Streams every page whose content contains `query` to `on_match`, then
    /// calls `on_done`. Pages without a loadable uri are skipped. Returns the
    /// number of delivered hits.
    pub fn search<M, D>(&self, query: &str, mut on_match: M, on_done: D) -> Result<usize>
    where
        M: FnMut(SearchHit) -> ControlFlow<()>,
        D: FnOnce(SearchSummary),
    {
        let started = Instant::now();
        let mut delivered = 0;
        let mut failure = None;

        self.archive.search(
            query,
            |page_id| match self.archive.load_uri(page_id) {
                Ok(Some(uri)) => {
                    delivered += 1;
                    on_match(SearchHit { page_id, uri })
                }
                Ok(None) => {
                    warn!(page_id, "search.uri.invalid");
                    ControlFlow::Continue(())
                }
                Err(err) => {
                    failure = Some(err);
                    ControlFlow::Break(())
                }
            },
            |_| {},
        )?;
        if let Some(err) = failure {
            return Err(err);
        }

        let summary = SearchSummary {
            query: query.to_string(),
            results: delivered,
            elapsed: started.elapsed(),
        };
        info!(
            query,
            results = delivered,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "search.done"
        );
        on_done(summary);
        Ok(delivered)
    }
}
