use doubletdb::protocol::{parse_line, Command};
use doubletdb::{Database, ProtocolHandler, Term};

fn session() -> (Database, ProtocolHandler) {
    let db = Database::in_memory().expect("db");
    let handler = ProtocolHandler::new(db.sequences().clone());
    (db, handler)
}

fn run(handler: &ProtocolHandler, line: &str) -> Vec<String> {
    handler.handle_line(line).expect("line handled")
}

#[test]
fn create_then_search_conversation() {
    let (_db, handler) = session();
    let created = run(&handler, "abc");
    assert_eq!(created.len(), 1);
    assert!(created[0].starts_with("Sequence with balanced variant at "));
    run(&handler, "xabcx");

    let reply = run(&handler, "abc?");
    assert_eq!(reply[0], "1 sequences matched fully.");
    assert!(reply[1].starts_with('\t') && reply[1].ends_with(": abc"));
    assert_eq!(reply[2], "2 sequences matched partially.");
    assert_eq!(reply.len(), 5);
}

#[test]
fn unknown_text_falls_back_to_connections() {
    let (_db, handler) = session();
    run(&handler, "cab");
    let reply = run(&handler, "ba?");
    assert_eq!(reply[0], "0 sequences matched fully.");
    assert_eq!(reply[1], "0 sequences matched partially.");
    assert_eq!(reply[2], "1 sequences connect query elements.");
    assert!(reply[3].ends_with(": cab"));
}

#[test]
fn star_patterns_only_report_pattern_matches() {
    let (_db, handler) = session();
    run(&handler, "start");
    run(&handler, "sprint");
    run(&handler, "stop");
    let reply = run(&handler, "s*t?");
    assert_eq!(reply[0], "2 sequences matched pattern.");
    assert_eq!(reply.len(), 3);
}

#[test]
fn escaped_question_mark_is_stored() {
    let (db, handler) = session();
    run(&handler, "why\\?");
    let root = db
        .sequences()
        .find(&doubletdb::unicode::encode("why?"))
        .expect("find");
    assert!(root.is_some());
    assert_eq!(
        parse_line("a~_?"),
        Some(Command::Search(vec![
            Term::Link(doubletdb::unicode::unit_to_link(u16::from(b'a'))),
            Term::Link(doubletdb::unicode::unit_to_link(u16::from(b'_'))),
        ]))
    );
}
