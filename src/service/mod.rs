//! Background crawl and search service.
//!
//! A [`Service`] owns one [`Database`] and runs every crawl and search on a
//! tracked thread. Crawl requests queue behind each other on a single lane;
//! searches run concurrently. Stopping cancels the shared token, waits for
//! every tracked thread and installs a fresh token. The [`Supervisor`]
//! replaces the whole service on reset.

mod events;
mod request;
mod supervisor;

pub use events::{EventSink, FnSink, NullSink, ServiceEvent};
pub use request::{Request, Response};
pub use supervisor::Supervisor;

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};
use url::Url;

use crate::concurrency::{CancelToken, WorkTracker};
use crate::config::Config;
use crate::crawler::{
    CrawlObserver, Crawler, Fetcher, PageCrawled, SiteReport, DEFAULT_RECRAWL_WINDOW,
};
use crate::db::Database;
use crate::search::SearchEngine;
use crate::storage::StoreOptions;
use crate::types::{DoubletError, Result};

/// Settings a [`Service`] is (re)built from.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Where and how to open the store.
    pub store: StoreOptions,
    /// Freshness window for crawls.
    pub recrawl_window: time::Duration,
}

impl ServiceOptions {
    /// Options for `store` with the default recrawl window.
    pub fn new(store: StoreOptions) -> Self {
        Self {
            store,
            recrawl_window: DEFAULT_RECRAWL_WINDOW,
        }
    }

    /// Options taken from a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            store: config.store_options(),
            recrawl_window: config.recrawl_window(),
        }
    }
}

/// Runs crawls and searches against one database.
pub struct Service {
    options: ServiceOptions,
    db: Arc<Database>,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn EventSink>,
    work: WorkTracker,
    cancel: Mutex<CancelToken>,
    crawl_lane: Arc<Mutex<()>>,
    next_job: AtomicU64,
    disposed: AtomicBool,
}

impl Service {
    /// Opens the database and returns an idle service.
    pub fn start(
        options: ServiceOptions,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let db = Arc::new(Database::open(options.store.clone())?);
        info!(path = ?options.store.path, "service.started");
        Ok(Self {
            options,
            db,
            fetcher,
            sink,
            work: WorkTracker::new(),
            cancel: Mutex::new(CancelToken::new()),
            crawl_lane: Arc::new(Mutex::new(())),
            next_job: AtomicU64::new(1),
            disposed: AtomicBool::new(false),
        })
    }

    /// Options the service was built from.
    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// The database served.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(DoubletError::Disposed)
        } else {
            Ok(())
        }
    }

    fn job_name(&self, kind: &str) -> String {
        format!("{kind}-{}", self.next_job.fetch_add(1, Ordering::SeqCst))
    }

    /// Queues a crawl of `urls`. Entries that are not absolute urls are
    /// rejected; the rest are crawled after any crawl already queued.
    pub fn start_crawl(&self, urls: &[String]) -> Result<Response> {
        self.ensure_live()?;
        let mut sites = Vec::new();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for raw in urls {
            match Url::parse(raw.trim()) {
                Ok(url) if !url.cannot_be_a_base() => {
                    accepted.push(url.to_string());
                    sites.push(url);
                }
                _ => rejected.push(raw.clone()),
            }
        }
        if !rejected.is_empty() {
            warn!(?rejected, "service.crawl.rejected");
        }
        if sites.is_empty() {
            return Ok(Response::CrawlQueued { accepted, rejected });
        }

        let crawler = Crawler::new(
            self.db.pages().clone(),
            Arc::clone(&self.fetcher),
            self.cancel.lock().clone(),
        )
        .with_recrawl_window(self.options.recrawl_window);
        let lane = Arc::clone(&self.crawl_lane);
        let sink = Arc::clone(&self.sink);
        let name = self.job_name("crawl");
        self.work.spawn(&name, move || {
            let _turn = lane.lock();
            let mut observer = SinkObserver { sink: sink.as_ref() };
            match crawler.run(&sites, &mut observer) {
                Ok(reports) => info!(sites = reports.len(), "service.crawl.done"),
                Err(err) => error!(error = %err, "service.crawl.failed"),
            }
        })?;
        Ok(Response::CrawlQueued { accepted, rejected })
    }

    /// Starts a search in the background; hits and the summary arrive as
    /// events.
    pub fn start_search(&self, query: &str) -> Result<Response> {
        self.ensure_live()?;
        let engine = SearchEngine::new(self.db.pages().clone());
        let cancel = self.cancel.lock().clone();
        let sink = Arc::clone(&self.sink);
        let owned = query.to_string();
        let name = self.job_name("search");
        self.work.spawn(&name, move || {
            let result = engine.search(
                &owned,
                |hit| {
                    if cancel.is_cancelled() {
                        return ControlFlow::Break(());
                    }
                    sink.emit(ServiceEvent::PageFound(hit))
                },
                |summary| {
                    let _ = sink.emit(ServiceEvent::SearchFinished(summary));
                },
            );
            if let Err(err) = result {
                error!(query = %owned, error = %err, "service.search.failed");
            }
        })?;
        Ok(Response::SearchStarted {
            query: query.to_string(),
        })
    }

    /// Cancels all running work, waits for it, and arms a fresh token so new
    /// work can start.
    pub fn stop_all(&self) -> Result<Response> {
        self.ensure_live()?;
        self.cancel_and_drain();
        Ok(Response::Stopped)
    }

    fn cancel_and_drain(&self) {
        let token = self.cancel.lock().clone();
        token.cancel();
        let joined = self.work.drain();
        *self.cancel.lock() = CancelToken::new();
        info!(joined, "service.stopped");
    }

    /// Waits for all queued work without cancelling it.
    pub fn wait_idle(&self) -> usize {
        self.work.drain()
    }

    /// Stops all work and releases the database. Every later call fails
    /// with [`DoubletError::Disposed`].
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(DoubletError::Disposed);
        }
        self.cancel_and_drain();
        self.db.dispose()?;
        info!("service.disposed");
        Ok(())
    }

    /// Whether [`Service::dispose`] ran.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        if !self.is_disposed() {
            if let Err(err) = self.dispose() {
                warn!(error = %err, "service.drop.dispose_failed");
            }
        }
    }
}

/// Forwards crawl progress to the event sink.
struct SinkObserver<'a> {
    sink: &'a dyn EventSink,
}

impl CrawlObserver for SinkObserver<'_> {
    fn page_crawled(&mut self, page: &PageCrawled) -> ControlFlow<()> {
        self.sink.emit(ServiceEvent::PageCrawled(page.clone()))
    }

    fn site_finished(&mut self, report: &SiteReport) {
        let _ = self.sink.emit(ServiceEvent::SiteCrawled {
            site: report.site.clone(),
            pages: report.pages,
        });
    }
}
