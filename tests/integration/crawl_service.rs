use std::fs;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use doubletdb::crawler::{CrawlDecision, CrawlHooks, FetchError, Fetcher, FileFetcher};
use doubletdb::db::PAGE_MARKER;
use doubletdb::service::{EventSink, Service};
use doubletdb::unicode::UNICODE_MAP_SIZE;
use doubletdb::{
    DoubletError, Request, Response, ServiceEvent, ServiceOptions, StoreOptions, Supervisor,
};
use tempfile::TempDir;
use url::Url;

fn site_dir() -> (TempDir, Url) {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("a.txt"), "doublets link everything").expect("write a");
    fs::write(dir.path().join("b.txt"), "sequences of links").expect("write b");
    fs::create_dir(dir.path().join("deep")).expect("mkdir");
    fs::write(dir.path().join("deep").join("c.txt"), "nothing to see").expect("write c");
    let url = Url::from_directory_path(dir.path()).expect("site url");
    (dir, url)
}

fn channel_service(options: ServiceOptions) -> (Service, Receiver<ServiceEvent>) {
    let (tx, rx) = mpsc::channel();
    let sink: Arc<dyn EventSink> = Arc::new(tx);
    let service = Service::start(options, Arc::new(FileFetcher::new()), sink).expect("service");
    (service, rx)
}

fn drain(rx: &Receiver<ServiceEvent>) -> Vec<ServiceEvent> {
    rx.try_iter().collect()
}

#[test]
fn crawl_then_search() {
    let (_site, url) = site_dir();
    let (service, rx) = channel_service(ServiceOptions::new(StoreOptions::in_memory()));

    let response = service.start_crawl(&[url.to_string()]).expect("crawl");
    assert!(matches!(response, Response::CrawlQueued { ref accepted, .. } if accepted.len() == 1));
    service.wait_idle();

    let events = drain(&rx);
    let crawled: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ServiceEvent::PageCrawled(page) => Some(page.page_uri.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(crawled.len(), 3);
    assert!(crawled[0].ends_with("a.txt"));
    assert!(events.iter().any(|e| matches!(e, ServiceEvent::SiteCrawled { pages: 3, .. })));

    service.start_search("link").expect("search");
    service.wait_idle();
    let events = drain(&rx);
    let found = events
        .iter()
        .filter(|e| matches!(e, ServiceEvent::PageFound(_)))
        .count();
    assert_eq!(found, 2);
    assert!(matches!(
        events.last(),
        Some(ServiceEvent::SearchFinished(summary)) if summary.results == 2
    ));
}

#[test]
fn recrawl_within_window_is_skipped() {
    let (_site, url) = site_dir();
    let (service, rx) = channel_service(ServiceOptions::new(StoreOptions::in_memory()));
    service.start_crawl(&[url.to_string()]).expect("first crawl");
    service.start_crawl(&[url.to_string()]).expect("second crawl");
    service.wait_idle();

    let sites: Vec<usize> = drain(&rx)
        .into_iter()
        .filter_map(|e| match e {
            ServiceEvent::SiteCrawled { pages, .. } => Some(pages),
            _ => None,
        })
        .collect();
    assert_eq!(sites, vec![3, 0]);
    assert_eq!(service.database().pages().page_count().expect("count"), 3);
}

/// Blocks inside the first page until released, then keeps offering pages
/// until the crawl is cancelled.
struct GateFetcher {
    entered: Arc<Barrier>,
}

impl Fetcher for GateFetcher {
    fn crawl(&self, site: &Url, hooks: &mut dyn CrawlHooks) -> Result<(), FetchError> {
        self.entered.wait();
        for n in 0.. {
            if hooks.is_cancelled() {
                break;
            }
            let page = site
                .join(&format!("page-{n}"))
                .map_err(|e| FetchError::Failed(e.to_string()))?;
            match hooks.should_crawl(&page) {
                CrawlDecision::Allow => {}
                CrawlDecision::CrawledToday => continue,
                CrawlDecision::Stop => break,
            }
            if hooks.page_fetched(&page, "endless").is_break() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

#[test]
fn stop_cancels_running_crawls() {
    let entered = Arc::new(Barrier::new(2));
    let fetcher = GateFetcher {
        entered: Arc::clone(&entered),
    };
    let (tx, _rx) = mpsc::channel();
    let service = Service::start(
        ServiceOptions::new(StoreOptions::in_memory()),
        Arc::new(fetcher),
        Arc::new(tx),
    )
    .expect("service");

    service
        .start_crawl(&["http://endless.example/".to_string()])
        .expect("crawl");
    entered.wait();
    assert_eq!(service.stop_all().expect("stop"), Response::Stopped);
    let stored = service.database().pages().page_count().expect("count");

    // The service takes new work after a stop.
    service.start_search("endless").expect("search");
    service.wait_idle();
    assert_eq!(service.database().pages().page_count().expect("count"), stored);
}

#[test]
fn disposed_service_refuses_work() {
    let (service, _rx) = channel_service(ServiceOptions::new(StoreOptions::in_memory()));
    service.dispose().expect("dispose");
    assert!(service.database().is_disposed());
    assert!(matches!(service.start_search("x"), Err(DoubletError::Disposed)));
    assert!(matches!(
        service.start_crawl(&["http://a.example/".into()]),
        Err(DoubletError::Disposed)
    ));
    assert!(matches!(service.stop_all(), Err(DoubletError::Disposed)));
    assert!(matches!(service.dispose(), Err(DoubletError::Disposed)));
}

#[test]
fn reset_starts_from_an_empty_file() {
    let (_site, url) = site_dir();
    let data = TempDir::new().expect("data dir");
    let options = ServiceOptions::new(StoreOptions::file(data.path().join("db.links")));
    let (tx, _rx) = mpsc::channel();
    let mut supervisor =
        Supervisor::start(options, Arc::new(FileFetcher::new()), Arc::new(tx)).expect("supervisor");

    supervisor
        .handle(Request::StartCrawl {
            urls: vec![url.to_string()],
        })
        .expect("crawl");
    let service = supervisor.service().expect("running");
    service.wait_idle();
    assert_eq!(service.database().pages().page_count().expect("count"), 3);

    assert_eq!(supervisor.handle(Request::Reset).expect("reset"), Response::Reset);
    let service = supervisor.service().expect("running after reset");
    assert_eq!(service.database().pages().page_count().expect("count"), 0);
    assert_eq!(
        service.database().store().len().expect("len"),
        UNICODE_MAP_SIZE + 2
    );
    assert!(service.database().store().get(PAGE_MARKER).expect("marker").is_point());

    assert_eq!(
        supervisor.handle(Request::Shutdown).expect("shutdown"),
        Response::ShutDown
    );
    assert!(matches!(
        supervisor.handle(Request::StopSearch),
        Err(DoubletError::Disposed)
    ));
}
