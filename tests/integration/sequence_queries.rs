use std::ops::ControlFlow;

use doubletdb::unicode::{self, UNICODE_MAP_SIZE};
use doubletdb::{Database, LinkId, Term};
use proptest::prelude::*;

fn text_db(lines: &[&str]) -> (Database, Vec<LinkId>) {
    let db = Database::in_memory().expect("db");
    let roots = lines
        .iter()
        .map(|line| db.sequences().create(&unicode::encode(line)).expect("create"))
        .collect();
    (db, roots)
}

fn containing(db: &Database, text: &str) -> Vec<LinkId> {
    let mut found = Vec::new();
    db.sequences()
        .find_containing(&unicode::encode(text), |root| {
            found.push(root);
            Ok(ControlFlow::Continue(()))
        })
        .expect("find containing");
    found.sort_unstable();
    found
}

#[test]
fn create_is_idempotent_and_findable() {
    let (db, roots) = text_db(&["abracadabra", "abracadabra"]);
    assert_eq!(roots[0], roots[1]);
    let codec = db.sequences();
    assert_eq!(codec.find(&unicode::encode("abracadabra")).expect("find"), Some(roots[0]));
    assert_eq!(codec.find(&unicode::encode("abracadabr")).expect("find"), None);
    assert_eq!(codec.format(roots[0]).expect("format"), "abracadabra");
}

#[test]
fn containment_finds_every_enclosing_sequence() {
    let (db, roots) = text_db(&["the cat sat", "a cat", "cathedral", "dog"]);
    let mut expected = vec![roots[0], roots[1], roots[2]];
    expected.sort_unstable();
    assert_eq!(containing(&db, "cat"), expected);
    assert_eq!(containing(&db, "dog"), vec![roots[3]]);
    assert!(containing(&db, "bird").is_empty());
}

#[test]
fn aligned_runs_share_sub_links() {
    let db = Database::in_memory().expect("db");
    let codec = db.sequences();
    let store = db.store();
    let abcd = unicode::encode("abcd");
    let short = codec.create(&abcd).expect("short");
    let doubled: Vec<LinkId> = abcd.iter().chain(abcd.iter()).copied().collect();
    let long = codec.create(&doubled).expect("long");

    // Both halves of the doubled run are the body of the short sequence.
    let body = store.get(short).expect("short root").target;
    let long_body = store.get(long).expect("long root").target;
    assert_eq!(store.get(long_body).expect("long body").source, body);
    assert_eq!(store.get(long_body).expect("long body").target, body);

    let ab = store.search(abcd[0], abcd[1]).expect("search").expect("(a, b) exists");
    assert_eq!(store.get(body).expect("body").source, ab);
    assert_eq!(store.count(Some(abcd[0]), Some(abcd[1])).expect("count"), 1);
}

#[test]
fn containment_does_not_need_shared_sub_links() {
    let (db, roots) = text_db(&["abc", "xabcx"]);
    let store = db.store();
    let body = store.get(roots[0]).expect("root").target;
    // "abc" sits at a different split inside "xabcx", so its body is used by
    // its own root only.
    let mut users = Vec::new();
    store
        .each(Some(body), None, |link| {
            users.push(link.id);
            ControlFlow::Continue(())
        })
        .expect("each");
    store
        .each(None, Some(body), |link| {
            users.push(link.id);
            ControlFlow::Continue(())
        })
        .expect("each");
    assert_eq!(users, vec![roots[0]]);

    let mut expected = roots.clone();
    expected.sort_unstable();
    assert_eq!(containing(&db, "abc"), expected);
}

#[test]
fn nested_sequences_are_elements() {
    let (db, roots) = text_db(&["ab", "cd"]);
    let codec = db.sequences();
    let outer = codec.create(&[roots[0], roots[1]]).expect("outer");
    assert_eq!(codec.decode(outer).expect("decode"), vec![roots[0], roots[1]]);
    // The inner sequences stay opaque elements of the outer one.
    let mut found = Vec::new();
    codec
        .find_containing(&[roots[1]], |root| {
            found.push(root);
            Ok(ControlFlow::Continue(()))
        })
        .expect("find containing");
    assert_eq!(found, vec![outer]);
}

#[test]
fn exact_and_pattern_matches() {
    let (db, roots) = text_db(&["cat", "cut", "coat", "act"]);
    let codec = db.sequences();
    let c = unicode::unit_to_link(u16::from(b'c'));
    let t = unicode::unit_to_link(u16::from(b't'));

    let mut exact = codec
        .match_exact(&[Term::Link(c), Term::Any, Term::Link(t)])
        .expect("exact");
    exact.sort_unstable();
    let mut expected = vec![roots[0], roots[1]];
    expected.sort_unstable();
    assert_eq!(exact, expected);

    let mut pattern = codec
        .match_pattern(&[Term::Link(c), Term::ZeroOrMany, Term::Link(t)])
        .expect("pattern");
    pattern.sort_unstable();
    let mut expected = vec![roots[0], roots[1], roots[2]];
    expected.sort_unstable();
    assert_eq!(pattern, expected);
}

#[test]
fn connections_ignore_order() {
    let (db, roots) = text_db(&["xy", "yx", "xz"]);
    let codec = db.sequences();
    let x = unicode::unit_to_link(u16::from(b'x'));
    let y = unicode::unit_to_link(u16::from(b'y'));
    let mut connected = codec
        .find_connections(&[Term::Link(y), Term::Link(x)])
        .expect("connections");
    connected.sort_unstable();
    let mut expected = vec![roots[0], roots[1]];
    expected.sort_unstable();
    assert_eq!(connected, expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn decode_inverts_create(units in prop::collection::vec(0u16..128, 1..40)) {
        let db = Database::in_memory().expect("db");
        let elements: Vec<LinkId> = units.iter().map(|&u| unicode::unit_to_link(u)).collect();
        let root = db.sequences().create(&elements).expect("create");
        prop_assert!(root > UNICODE_MAP_SIZE);
        prop_assert_eq!(db.sequences().decode(root).expect("decode"), elements.clone());
        prop_assert_eq!(db.sequences().find(&elements).expect("find"), Some(root));
    }
}
