use std::ops::ControlFlow;

use doubletdb::{Database, DoubletError, SearchEngine};
use time::macros::datetime;
use time::OffsetDateTime;

fn hits(db: &Database, query: &str) -> Vec<String> {
    let mut uris = Vec::new();
    SearchEngine::new(db.pages().clone())
        .search(
            query,
            |hit| {
                uris.push(hit.uri);
                ControlFlow::Continue(())
            },
            |_| {},
        )
        .expect("search");
    uris.sort();
    uris
}

#[test]
fn latest_crawl_time_wins() {
    let db = Database::in_memory().expect("db");
    let pages = db.pages();
    let uri = "http://site.example/news";
    assert_eq!(
        pages.max_crawled_timestamp(uri).expect("never crawled"),
        OffsetDateTime::UNIX_EPOCH
    );

    let first = pages
        .save(uri, datetime!(2024-03-01 08:00:00 UTC), "morning edition")
        .expect("first save");
    let second = pages
        .save(uri, datetime!(2024-03-02 08:00:00 UTC), "evening edition")
        .expect("second save");
    assert_ne!(first, second);
    assert_eq!(
        pages.max_crawled_timestamp(uri).expect("crawled"),
        datetime!(2024-03-02 08:00:00 UTC)
    );
    assert_eq!(
        pages.load_timestamp(first).expect("timestamp"),
        Some(datetime!(2024-03-01 08:00:00 UTC))
    );
    assert_eq!(pages.load_uri(second).expect("uri"), Some(uri.to_string()));
    assert_eq!(pages.page_count().expect("count"), 2);
}

#[test]
fn timestamps_are_stored_in_utc_seconds() {
    let db = Database::in_memory().expect("db");
    let pages = db.pages();
    let local = datetime!(2024-06-01 12:30:15.75 +02:00);
    let page = pages
        .save("http://site.example/", local, "body")
        .expect("save");
    assert_eq!(
        pages.load_timestamp(page).expect("timestamp"),
        Some(datetime!(2024-06-01 10:30:15 UTC))
    );
}

#[test]
fn identical_crawls_share_a_record() {
    let db = Database::in_memory().expect("db");
    let pages = db.pages();
    let at = datetime!(2024-01-01 00:00:00 UTC);
    let a = pages.save("http://site.example/", at, "same").expect("save");
    let b = pages.save("http://site.example/", at, "same").expect("save again");
    assert_eq!(a, b);
    assert_eq!(pages.page_count().expect("count"), 1);
}

#[test]
fn empty_pages_are_invalid() {
    let db = Database::in_memory().expect("db");
    let now = OffsetDateTime::now_utc();
    assert!(matches!(
        db.pages().save("http://site.example/", now, ""),
        Err(DoubletError::Invalid(_))
    ));
    assert!(matches!(
        db.pages().save("", now, "text"),
        Err(DoubletError::Invalid(_))
    ));
}

#[test]
fn search_covers_uris_and_content() {
    let db = Database::in_memory().expect("db");
    let pages = db.pages();
    let now = OffsetDateTime::now_utc();
    pages.save("http://rust.example/", now, "systems programming").expect("save");
    pages.save("http://go.example/", now, "rust never sleeps").expect("save");
    pages.save("http://c.example/", now, "pointers everywhere").expect("save");

    assert_eq!(
        hits(&db, "rust"),
        vec!["http://go.example/", "http://rust.example/"]
    );
    assert_eq!(
        hits(&db, "er"),
        vec!["http://c.example/", "http://go.example/"]
    );
    assert_eq!(
        hits(&db, ".example/"),
        vec!["http://c.example/", "http://go.example/", "http://rust.example/"]
    );
    assert!(hits(&db, "haskell").is_empty());
    assert!(hits(&db, "").is_empty());
}

#[test]
fn hello_world_resolves_to_its_uri() {
    let db = Database::in_memory().expect("db");
    db.pages()
        .save("http://example.com/", OffsetDateTime::now_utc(), "Hello World")
        .expect("save");
    assert_eq!(hits(&db, "World"), vec!["http://example.com/"]);
    assert_eq!(hits(&db, "example.com"), vec!["http://example.com/"]);
}

#[test]
fn plain_sequences_are_not_pages() {
    let db = Database::in_memory().expect("db");
    db.sequences()
        .create(&doubletdb::unicode::encode("orphan text"))
        .expect("create");
    assert!(hits(&db, "orphan").is_empty());
    assert_eq!(db.pages().load_content("http://nowhere.example/").expect("load"), None);
}
