use std::ops::ControlFlow;

use doubletdb::db::{PAGE_MARKER, SEQUENCE_MARKER};
use doubletdb::unicode::UNICODE_MAP_SIZE;
use doubletdb::{Database, DoubletError, LinkStore, StoreOptions};
use tempfile::TempDir;

fn small_file(dir: &TempDir) -> StoreOptions {
    StoreOptions::file(dir.path().join("db.links")).initial_capacity(16)
}

#[test]
fn reopen_preserves_links() {
    let dir = TempDir::new().expect("temp dir");
    let (a, b, pair) = {
        let store = LinkStore::open(small_file(&dir)).expect("open store");
        let a = store.create_point().expect("point a");
        let b = store.create_point().expect("point b");
        let pair = store.get_or_create(a, b).expect("pair");
        for _ in 0..100 {
            let p = store.create_point().expect("filler");
            store.get_or_create(p, a).expect("filler pair");
        }
        store.dispose().expect("dispose");
        (a, b, pair)
    };

    let store = LinkStore::open(small_file(&dir)).expect("reopen store");
    assert_eq!(store.len().expect("len"), 203);
    assert_eq!(store.search(a, b).expect("search"), Some(pair));
    assert_eq!(store.get_or_create(a, b).expect("existing pair"), pair);
    assert_eq!(store.count(None, Some(a)).expect("count"), 101);
    store.verify().expect("trees are consistent");
}

#[test]
fn second_process_cannot_open_a_locked_file() {
    let dir = TempDir::new().expect("temp dir");
    let _first = LinkStore::open(small_file(&dir)).expect("open store");
    assert!(LinkStore::open(small_file(&dir)).is_err());
}

#[test]
fn database_reopen_keeps_markers_and_pages() {
    let dir = TempDir::new().expect("temp dir");
    let options = StoreOptions::file(dir.path().join("db.links"));
    {
        let db = Database::open(options.clone()).expect("open db");
        db.pages()
            .save("file:///site/a.txt", time::OffsetDateTime::now_utc(), "alpha")
            .expect("save page");
        db.dispose().expect("dispose");
    }
    let db = Database::open(options).expect("reopen db");
    assert!(db.store().get(PAGE_MARKER).expect("page marker").is_point());
    assert!(db.store().get(SEQUENCE_MARKER).expect("sequence marker").is_point());
    assert_eq!(db.pages().page_count().expect("page count"), 1);
    assert_eq!(
        db.pages().load_content("file:///site/a.txt").expect("load"),
        Some("alpha".to_string())
    );
}

#[test]
fn non_point_at_page_marker_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let options = StoreOptions::file(dir.path().join("db.links"));
    {
        let store = LinkStore::open(options.clone()).expect("open store");
        let mut last = 0;
        for _ in 0..UNICODE_MAP_SIZE {
            last = store.create_point().expect("atom");
        }
        assert_eq!(last, UNICODE_MAP_SIZE);
        // Occupies the page marker slot with a pair of atoms.
        let pair = store.get_or_create(1, 2).expect("pair");
        assert_eq!(pair, PAGE_MARKER);
        store.dispose().expect("dispose");
    }
    match Database::open(options) {
        Err(DoubletError::MarkerMismatch { expected, .. }) => assert_eq!(expected, PAGE_MARKER),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("database opened over a foreign store"),
    }
}

#[test]
fn disposed_store_rejects_everything() {
    let store = LinkStore::in_memory().expect("store");
    let p = store.create_point().expect("point");
    store.dispose().expect("dispose");
    assert!(matches!(store.get(p), Err(DoubletError::Disposed)));
    assert!(matches!(store.create_point(), Err(DoubletError::Disposed)));
    assert!(matches!(
        store.each(None, None, |_| ControlFlow::Continue(())),
        Err(DoubletError::Disposed)
    ));
    assert!(matches!(store.dispose(), Err(DoubletError::Disposed)));
}
