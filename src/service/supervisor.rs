use std::sync::Arc;

use tracing::info;

use super::{EventSink, Request, Response, Service, ServiceOptions};
use crate::crawler::Fetcher;
use crate::db::Database;
use crate::types::{DoubletError, Result};

/// Owns the running [`Service`] and dispatches [`Request`]s to it.
pub struct Supervisor {
    options: ServiceOptions,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn EventSink>,
    service: Option<Service>,
}

impl Supervisor {
    /// Starts the first service.
    pub fn start(
        options: ServiceOptions,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let service = Service::start(options.clone(), Arc::clone(&fetcher), Arc::clone(&sink))?;
        Ok(Self {
            options,
            fetcher,
            sink,
            service: Some(service),
        })
    }

    /// The running service, if not shut down.
    pub fn service(&self) -> Option<&Service> {
        self.service.as_ref()
    }

    /// Whether a service is running.
    pub fn is_running(&self) -> bool {
        self.service.is_some()
    }

    fn running(&self) -> Result<&Service> {
        self.service.as_ref().ok_or(DoubletError::Disposed)
    }

    /// Handles one request. After [`Request::Shutdown`] every request fails
    /// with [`DoubletError::Disposed`].
    pub fn handle(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::StartCrawl { urls } => self.running()?.start_crawl(&urls),
            Request::StartSearch { query } => self.running()?.start_search(&query),
            Request::StopCrawl | Request::StopSearch => self.running()?.stop_all(),
            Request::Reset => self.reset(),
            Request::Shutdown => {
                let service = self.service.take().ok_or(DoubletError::Disposed)?;
                service.dispose()?;
                info!("supervisor.shutdown");
                Ok(Response::ShutDown)
            }
        }
    }

    fn reset(&mut self) -> Result<Response> {
        let service = self.service.take().ok_or(DoubletError::Disposed)?;
        service.dispose()?;
        drop(service);
        if let Some(path) = &self.options.store.path {
            Database::destroy(path)?;
        }
        self.service = Some(Service::start(
            self.options.clone(),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.sink),
        )?);
        info!("supervisor.reset");
        Ok(Response::Reset)
    }
}
