use std::ops::ControlFlow;
use std::sync::mpsc::Sender;

use serde::Serialize;

use crate::crawler::PageCrawled;
use crate::search::{SearchHit, SearchSummary};

/// Progress reported by background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    /// A page was fetched and archived.
    PageCrawled(PageCrawled),
    /// A search found a page.
    PageFound(SearchHit),
    /// A search completed.
    SearchFinished(SearchSummary),
    /// A site crawl completed.
    SiteCrawled {
        /// Site url.
        site: String,
        /// Pages archived.
        pages: usize,
    },
}

/// Receives [`ServiceEvent`]s. Returning `Break` stops the work unit that
/// produced the event.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: ServiceEvent) -> ControlFlow<()>;
}

impl EventSink for Sender<ServiceEvent> {
    fn emit(&self, event: ServiceEvent) -> ControlFlow<()> {
        match self.send(event) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }
}

/// Adapts a closure into an [`EventSink`].
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(ServiceEvent) -> ControlFlow<()> + Send + Sync,
{
    fn emit(&self, event: ServiceEvent) -> ControlFlow<()> {
        (self.0)(event)
    }
}

/// Drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ServiceEvent) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}
