//! Crawl orchestration: freshness decisions, archiving of fetched pages and a
//! sequential site worklist.
//!
//! Fetching itself belongs to a [`Fetcher`]. The crawler hands it a
//! [`CrawlHooks`] session per site, consulted before every page and told
//! about every fetched page.

mod decision;
mod file_fetcher;

pub use decision::{decide_at, CrawlDecision, DEFAULT_RECRAWL_WINDOW};
pub use file_fetcher::FileFetcher;

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::concurrency::CancelToken;
use crate::pages::PageArchive;
use crate::types::{DoubletError, Result};

/// Errors reported by a [`Fetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The fetcher cannot handle this kind of url.
    #[error("unsupported site url {0}")]
    Unsupported(String),
    /// Reading a page failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Page being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Listing the site failed.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
    /// Any other fetcher failure.
    #[error("fetch failed: {0}")]
    Failed(String),
}

/// Callbacks a fetcher drives while crawling one site.
pub trait CrawlHooks {
    /// Asked before fetching `url`. `Stop` ends the site.
    fn should_crawl(&mut self, url: &Url) -> CrawlDecision;
    /// Reports a fetched page. `Break` ends the site.
    fn page_fetched(&mut self, url: &Url, content: &str) -> ControlFlow<()>;
    /// Polled between pages.
    fn is_cancelled(&self) -> bool;
}

/// Retrieves the pages of a site. Politeness and parsing are up to the
/// implementation.
pub trait Fetcher: Send + Sync {
    /// Crawls `site`, driving `hooks` until the site is exhausted or a hook
    /// asks to stop.
    fn crawl(&self, site: &Url, hooks: &mut dyn CrawlHooks) -> std::result::Result<(), FetchError>;
}

/// Notification for one archived page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageCrawled {
    /// Site the crawl started from.
    pub site_uri: String,
    /// Page that was fetched.
    pub page_uri: String,
    /// Page text.
    pub content: String,
}

/// Outcome of crawling one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteReport {
    /// Site url.
    pub site: String,
    /// Pages archived during this crawl.
    pub pages: usize,
    /// Fetcher failure, if the site ended with one.
    pub error: Option<String>,
}

/// Receives crawl progress.
pub trait CrawlObserver {
    /// Called after a page was archived. `Break` ends the current site.
    fn page_crawled(&mut self, page: &PageCrawled) -> ControlFlow<()>;

    /// Called when a site is done.
    fn site_finished(&mut self, _report: &SiteReport) {}
}

impl<F> CrawlObserver for F
where
    F: FnMut(&PageCrawled) -> ControlFlow<()>,
{
    fn page_crawled(&mut self, page: &PageCrawled) -> ControlFlow<()> {
        self(page)
    }
}

/// Crawls sites one after another into a [`PageArchive`].
pub struct Crawler {
    archive: PageArchive,
    fetcher: Arc<dyn Fetcher>,
    cancel: CancelToken,
    recrawl_window: Duration,
}

impl Crawler {
    /// Creates a crawler observing `cancel`.
    pub fn new(archive: PageArchive, fetcher: Arc<dyn Fetcher>, cancel: CancelToken) -> Self {
        Self {
            archive,
            fetcher,
            cancel,
            recrawl_window: DEFAULT_RECRAWL_WINDOW,
        }
    }

    /// Overrides the freshness window.
    pub fn with_recrawl_window(mut self, window: Duration) -> Self {
        self.recrawl_window = window;
        self
    }

    /// Decision for `url` right now.
    pub fn decide(&self, url: &Url) -> CrawlDecision {
        decide_at(
            &self.archive,
            &self.cancel,
            self.recrawl_window,
            url,
            OffsetDateTime::now_utc(),
        )
    }

    /// Crawls every site of `worklist` in order, checking for cancellation
    /// before each one. A fetcher failure ends only its site; an archive
    /// failure ends the run.
    pub fn run(&self, worklist: &[Url], observer: &mut dyn CrawlObserver) -> Result<Vec<SiteReport>> {
        let mut reports = Vec::with_capacity(worklist.len());
        for site in worklist {
            if self.cancel.is_cancelled() {
                info!(remaining = worklist.len() - reports.len(), "crawler.cancelled");
                break;
            }
            let report = self.crawl_site(site, observer)?;
            observer.site_finished(&report);
            reports.push(report);
        }
        Ok(reports)
    }

    /// Crawls a single site.
    pub fn crawl_site(&self, site: &Url, observer: &mut dyn CrawlObserver) -> Result<SiteReport> {
        info!(site = %site, "crawler.site.start");
        let mut session = SiteSession {
            crawler: self,
            site,
            observer,
            pages: 0,
            halted: false,
            failure: None,
        };
        let fetched = self.fetcher.crawl(site, &mut session);
        let pages = session.pages;
        if let Some(err) = session.failure {
            error!(site = %site, error = %err, "crawler.site.failed");
            return Err(err);
        }

        let error = match fetched {
            Ok(()) => None,
            Err(err) => {
                warn!(site = %site, error = %err, "crawler.fetch.failed");
                Some(err.to_string())
            }
        };
        info!(site = %site, pages, "crawler.site.done");
        Ok(SiteReport {
            site: site.to_string(),
            pages,
            error,
        })
    }
}

struct SiteSession<'a> {
    crawler: &'a Crawler,
    site: &'a Url,
    observer: &'a mut dyn CrawlObserver,
    pages: usize,
    halted: bool,
    failure: Option<DoubletError>,
}

impl CrawlHooks for SiteSession<'_> {
    fn should_crawl(&mut self, url: &Url) -> CrawlDecision {
        if self.halted {
            return CrawlDecision::Stop;
        }
        let decision = self.crawler.decide(url);
        debug!(url = %url, ?decision, "crawler.decision");
        decision
    }

    fn page_fetched(&mut self, url: &Url, content: &str) -> ControlFlow<()> {
        // A page fetched before a stop request is still archived.
        if self.halted {
            return ControlFlow::Break(());
        }
        match self
            .crawler
            .archive
            .save(url.as_str(), OffsetDateTime::now_utc(), content)
        {
            Ok(page) => {
                self.pages += 1;
                debug!(url = %url, page, "crawler.page.saved");
                let event = PageCrawled {
                    site_uri: self.site.to_string(),
                    page_uri: url.to_string(),
                    content: content.to_string(),
                };
                if self.observer.page_crawled(&event).is_break() {
                    self.halted = true;
                    return ControlFlow::Break(());
                }
            }
            Err(DoubletError::Invalid(reason)) => {
                warn!(url = %url, %reason, "crawler.page.skipped");
            }
            Err(err) => {
                self.failure = Some(err);
                self.halted = true;
                return ControlFlow::Break(());
            }
        }

        if self.crawler.cancel.is_cancelled() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn is_cancelled(&self) -> bool {
        self.halted || self.crawler.cancel.is_cancelled()
    }
}
