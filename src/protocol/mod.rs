//! Line protocol for creating and searching sequences.
//!
//! A line ending in an unescaped `?` is a search, anything else creates a
//! sequence from the line's text. `\` and `~` make the next character literal.
//! In searches `_` stands for any single element and `*` for any run.

mod handler;

pub use handler::ProtocolHandler;

use crate::sequences::Term;
use crate::types::LinkId;
use crate::unicode;

/// A parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store the elements as a sequence.
    Create(Vec<LinkId>),
    /// Look up sequences matching the pattern.
    Search(Vec<Term>),
}

fn is_escape(c: char) -> bool {
    c == '\\' || c == '~'
}

/// Whether the line ends in a `?` preceded by an even number of escapes.
pub fn is_search(line: &str) -> bool {
    let mut chars = line.chars().rev();
    if chars.next() != Some('?') {
        return false;
    }
    chars.take_while(|&c| is_escape(c)).count() % 2 == 0
}

/// Parses one line. Blank lines yield `None`; surrounding whitespace is
/// ignored.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let search = is_search(line);
    let body: Vec<char> = if search {
        line[..line.len() - 1].chars().collect()
    } else {
        line.chars().collect()
    };

    let mut terms = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let c = body[i];
        match c {
            c if is_escape(c) && i + 1 < body.len() => {
                push_literal(&mut terms, body[i + 1]);
                i += 1;
            }
            '_' if search => terms.push(Term::Any),
            '*' if search => terms.push(Term::ZeroOrMany),
            c => push_literal(&mut terms, c),
        }
        i += 1;
    }

    Some(if search {
        Command::Search(terms)
    } else {
        Command::Create(terms.into_iter().filter_map(|t| t.link()).collect())
    })
}

fn push_literal(terms: &mut Vec<Term>, c: char) {
    let mut units = [0u16; 2];
    terms.extend(
        c.encode_utf16(&mut units)
            .iter()
            .map(|&u| Term::Link(unicode::unit_to_link(u))),
    );
}
