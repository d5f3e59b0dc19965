use std::fmt;

use crate::types::LinkId;

/// One position of a sequence query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Term {
    /// Exactly this element.
    Link(LinkId),
    /// Any single element.
    Any,
    /// Any run of elements, including the empty run.
    ZeroOrMany,
}

impl Term {
    /// The concrete element, if any.
    pub fn link(&self) -> Option<LinkId> {
        match self {
            Term::Link(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<LinkId> for Term {
    fn from(id: LinkId) -> Self {
        Term::Link(id)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Link(id) => write!(f, "{id}"),
            Term::Any => f.write_str("_"),
            Term::ZeroOrMany => f.write_str("*"),
        }
    }
}

/// Anchored wildcard match of `pattern` against the whole of `elements`.
pub(crate) fn glob_matches(pattern: &[Term], elements: &[LinkId]) -> bool {
    let (mut p, mut e) = (0, 0);
    // Position of the last `ZeroOrMany` and the element it currently absorbs up to.
    let mut backtrack: Option<(usize, usize)> = None;
    while e < elements.len() {
        match pattern.get(p) {
            Some(Term::ZeroOrMany) => {
                backtrack = Some((p, e));
                p += 1;
            }
            Some(Term::Any) => {
                p += 1;
                e += 1;
            }
            Some(Term::Link(id)) if *id == elements[e] => {
                p += 1;
                e += 1;
            }
            _ => match backtrack {
                Some((star, absorbed)) => {
                    backtrack = Some((star, absorbed + 1));
                    p = star + 1;
                    e = absorbed + 1;
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|t| *t == Term::ZeroOrMany)
}

/// Whether `needle` occurs contiguously in `haystack`.
pub(crate) fn contains_run(haystack: &[LinkId], needle: &[LinkId]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
