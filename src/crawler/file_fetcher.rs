use std::fs;
use std::thread;
use std::time::Duration;

use tracing::trace;
use url::Url;
use walkdir::WalkDir;

use super::{CrawlDecision, CrawlHooks, FetchError, Fetcher};

/// Fetcher for `file://` sites: a file is one page, a directory is every
/// regular file below it, visited in file-name order.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    delay: Duration,
}

impl FileFetcher {
    /// A fetcher without a delay between pages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps `delay` between two page fetches.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Fetcher for FileFetcher {
    fn crawl(&self, site: &Url, hooks: &mut dyn CrawlHooks) -> Result<(), FetchError> {
        if site.scheme() != "file" {
            return Err(FetchError::Unsupported(site.to_string()));
        }
        let root = site
            .to_file_path()
            .map_err(|()| FetchError::Unsupported(site.to_string()))?;

        let mut fetched_any = false;
        for entry in WalkDir::new(&root).sort_by_file_name() {
            if hooks.is_cancelled() {
                break;
            }
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let page = Url::from_file_path(entry.path())
                .map_err(|()| FetchError::Unsupported(entry.path().display().to_string()))?;

            match hooks.should_crawl(&page) {
                CrawlDecision::Allow => {}
                CrawlDecision::CrawledToday => {
                    trace!(page = %page, "fetcher.skip");
                    continue;
                }
                CrawlDecision::Stop => break,
            }

            if fetched_any && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            fetched_any = true;

            let bytes = fs::read(entry.path()).map_err(|source| FetchError::Io {
                path: entry.path().to_path_buf(),
                source,
            })?;
            let content = String::from_utf8_lossy(&bytes);
            if hooks.page_fetched(&page, &content).is_break() {
                break;
            }
        }
        Ok(())
    }
}
