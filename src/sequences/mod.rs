//! Ordered sequences stored as balanced trees of doublets.
//!
//! A sequence of elements `e0..en` is stored as `(marker, body)`. The body of
//! a single element is the element itself; a longer run is split at
//! `len / 2` and both halves are paired recursively. Pairs go through
//! [`LinkStore::get_or_create`], so the same run at the same tree position is
//! the same link everywhere in the store, which is what the search operations
//! below walk.
//!
//! Elements are atomic: a point other than the marker, or the root of another
//! sequence. Everything else is a body pair, which keeps decoding unambiguous.

mod pattern;

pub use pattern::Term;

use std::ops::ControlFlow;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::storage::LinkStore;
use crate::types::{DoubletError, Link, LinkId, Result};
use crate::unicode;

use pattern::{contains_run, glob_matches};

/// Links that match one subtree position of an exact query.
enum Candidates {
    /// Only wildcards below; any subtree of the right shape matches.
    Unbounded,
    /// The matching subtrees, already checked for shape.
    Found(Vec<LinkId>),
}

/// Encoder, decoder and query engine for sequences tagged with one marker.
#[derive(Clone)]
pub struct SequenceCodec {
    store: Arc<LinkStore>,
    marker: LinkId,
}

impl SequenceCodec {
    /// Creates a codec tagging roots with `marker`.
    pub fn new(store: Arc<LinkStore>, marker: LinkId) -> Self {
        Self { store, marker }
    }

    /// The sequence marker.
    pub fn marker(&self) -> LinkId {
        self.marker
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<LinkStore> {
        &self.store
    }

    fn is_element(&self, link: &Link) -> bool {
        link.id != self.marker && (link.is_point() || link.source == self.marker)
    }

    fn check_element(&self, id: LinkId) -> Result<()> {
        let link = self.store.get(id)?;
        if self.is_element(&link) {
            Ok(())
        } else {
            Err(DoubletError::invalid(format!(
                "link {id} cannot be a sequence element"
            )))
        }
    }

    /// Whether `id` is the root of a sequence.
    pub fn is_sequence(&self, id: LinkId) -> Result<bool> {
        let link = self.store.get(id)?;
        Ok(link.source == self.marker && link.id != self.marker)
    }

    /// Stores `elements` and returns the root. Storing the same elements
    /// twice returns the same root.
    pub fn create(&self, elements: &[LinkId]) -> Result<LinkId> {
        if elements.is_empty() {
            return Err(DoubletError::invalid("sequence must not be empty"));
        }
        for &element in elements {
            self.check_element(element)?;
        }
        let body = self.build(elements)?;
        let root = self.store.get_or_create(self.marker, body)?;
        trace!(root, len = elements.len(), "sequences.create");
        Ok(root)
    }

    fn build(&self, elements: &[LinkId]) -> Result<LinkId> {
        if let [single] = elements {
            return Ok(*single);
        }
        let (left, right) = elements.split_at(elements.len() / 2);
        let left = self.build(left)?;
        let right = self.build(right)?;
        self.store.get_or_create(left, right)
    }

    /// Root of `elements` if they were stored before.
    pub fn find(&self, elements: &[LinkId]) -> Result<Option<LinkId>> {
        if elements.is_empty() {
            return Ok(None);
        }
        match self.lookup(elements)? {
            Some(body) => self.store.search(self.marker, body),
            None => Ok(None),
        }
    }

    fn lookup(&self, elements: &[LinkId]) -> Result<Option<LinkId>> {
        if let [single] = elements {
            return Ok(Some(*single));
        }
        let (left, right) = elements.split_at(elements.len() / 2);
        let Some(left) = self.lookup(left)? else {
            return Ok(None);
        };
        let Some(right) = self.lookup(right)? else {
            return Ok(None);
        };
        self.store.search(left, right)
    }

    /// Elements of the sequence rooted at `root`.
    pub fn decode(&self, root: LinkId) -> Result<Vec<LinkId>> {
        let link = self.store.get(root)?;
        if link.source != self.marker || link.id == self.marker {
            return Err(DoubletError::invalid(format!(
                "link {root} is not a sequence root"
            )));
        }
        let mut elements = Vec::new();
        let mut stack = vec![link.target];
        while let Some(node) = stack.pop() {
            let link = self.store.get(node)?;
            if self.is_element(&link) {
                elements.push(node);
            } else {
                stack.push(link.target);
                stack.push(link.source);
            }
        }
        Ok(elements)
    }

    /// Renders a sequence for listings: code units as text, other elements
    /// as `(id)`.
    pub fn format(&self, root: LinkId) -> Result<String> {
        Ok(unicode::render(&self.decode(root)?))
    }

    /// Whether the subtree at `id` has the body shape of a run of `len`
    /// elements.
    fn shape_matches(&self, id: LinkId, len: usize) -> Result<bool> {
        let link = self.store.get(id)?;
        if len == 1 {
            return Ok(self.is_element(&link));
        }
        if self.is_element(&link) {
            return Ok(false);
        }
        let left = len / 2;
        Ok(self.shape_matches(link.source, left)? && self.shape_matches(link.target, len - left)?)
    }

    /// Roots of sequences with exactly the pattern's length whose elements
    /// match it position by position. `ZeroOrMany` is not accepted here.
    pub fn match_exact(&self, pattern: &[Term]) -> Result<Vec<LinkId>> {
        if pattern.contains(&Term::ZeroOrMany) {
            return Err(DoubletError::invalid(
                "exact matching does not accept ZeroOrMany",
            ));
        }
        if pattern.is_empty() {
            return Ok(Vec::new());
        }

        let mut roots = Vec::new();
        match self.resolve(pattern)? {
            Candidates::Unbounded => {
                let mut bodies = Vec::new();
                self.store.each(Some(self.marker), None, |link| {
                    if link.id != self.marker {
                        bodies.push(link);
                    }
                    ControlFlow::Continue(())
                })?;
                for link in bodies {
                    if self.shape_matches(link.target, pattern.len())? {
                        roots.push(link.id);
                    }
                }
            }
            Candidates::Found(bodies) => {
                for body in bodies {
                    if let Some(root) = self.store.search(self.marker, body)? {
                        roots.push(root);
                    }
                }
            }
        }
        roots.sort_unstable();
        roots.dedup();
        debug!(pattern_len = pattern.len(), matches = roots.len(), "sequences.match_exact");
        Ok(roots)
    }

    fn resolve(&self, pattern: &[Term]) -> Result<Candidates> {
        if let [term] = pattern {
            return Ok(match term {
                Term::Link(id) => Candidates::Found(vec![*id]),
                _ => Candidates::Unbounded,
            });
        }

        let split = pattern.len() / 2;
        let (left_len, right_len) = (split, pattern.len() - split);
        let left = self.resolve(&pattern[..split])?;
        let right = self.resolve(&pattern[split..])?;

        let mut found = Vec::new();
        match (left, right) {
            (Candidates::Unbounded, Candidates::Unbounded) => return Ok(Candidates::Unbounded),
            (Candidates::Found(lefts), Candidates::Found(rights)) => {
                for &l in &lefts {
                    for &r in &rights {
                        if let Some(pair) = self.store.search(l, r)? {
                            found.push(pair);
                        }
                    }
                }
            }
            (Candidates::Found(lefts), Candidates::Unbounded) => {
                for l in lefts {
                    for link in self.links_from(l)? {
                        if link.id != l && self.shape_matches(link.target, right_len)? {
                            found.push(link.id);
                        }
                    }
                }
            }
            (Candidates::Unbounded, Candidates::Found(rights)) => {
                for r in rights {
                    for link in self.links_to(r)? {
                        if link.id != r
                            && link.source != self.marker
                            && self.shape_matches(link.source, left_len)?
                        {
                            found.push(link.id);
                        }
                    }
                }
            }
        }
        Ok(Candidates::Found(found))
    }

    fn links_from(&self, source: LinkId) -> Result<Vec<Link>> {
        let mut links = Vec::new();
        self.store.each(Some(source), None, |link| {
            links.push(link);
            ControlFlow::Continue(())
        })?;
        Ok(links)
    }

    fn links_to(&self, target: LinkId) -> Result<Vec<Link>> {
        let mut links = Vec::new();
        self.store.each(None, Some(target), |link| {
            links.push(link);
            ControlFlow::Continue(())
        })?;
        Ok(links)
    }

    /// Roots of sequences matching a pattern that may contain `ZeroOrMany`.
    /// Without `ZeroOrMany` this is [`SequenceCodec::match_exact`].
    pub fn match_pattern(&self, pattern: &[Term]) -> Result<Vec<LinkId>> {
        if !pattern.contains(&Term::ZeroOrMany) {
            return self.match_exact(pattern);
        }

        let concrete: Vec<LinkId> = pattern.iter().filter_map(Term::link).collect();
        let candidates = match self.rarest(&concrete)? {
            Some(anchor) => self.containing_roots(anchor)?,
            None => self.all_roots()?,
        };

        let mut roots = Vec::new();
        for root in candidates {
            if glob_matches(pattern, &self.decode(root)?) {
                roots.push(root);
            }
        }
        debug!(pattern_len = pattern.len(), matches = roots.len(), "sequences.match_pattern");
        Ok(roots)
    }

    /// Visits, in root id order, every stored sequence that contains `run`
    /// as a contiguous part. Returns `Break` when the visitor stopped early.
    pub fn find_containing<F>(&self, run: &[LinkId], mut visitor: F) -> Result<ControlFlow<()>>
    where
        F: FnMut(LinkId) -> Result<ControlFlow<()>>,
    {
        let Some(anchor) = self.rarest(run)? else {
            return Ok(ControlFlow::Continue(()));
        };
        for &element in run {
            if !self.store.exists(element)? {
                return Ok(ControlFlow::Continue(()));
            }
        }

        let candidates = self.containing_roots(anchor)?;
        debug!(anchor, candidates = candidates.len(), "sequences.find_containing");
        for root in candidates {
            if contains_run(&self.decode(root)?, run) && visitor(root)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Roots of sequences holding every concrete element of `pattern`, in any
    /// order and position.
    pub fn find_connections(&self, pattern: &[Term]) -> Result<Vec<LinkId>> {
        let mut elements: Vec<LinkId> = pattern.iter().filter_map(Term::link).collect();
        elements.sort_unstable();
        elements.dedup();
        let Some((&first, rest)) = elements.split_first() else {
            return Ok(Vec::new());
        };

        let mut shared: FxHashSet<LinkId> = self.containing_roots(first)?.into_iter().collect();
        for &element in rest {
            if shared.is_empty() {
                break;
            }
            let roots: FxHashSet<LinkId> = self.containing_roots(element)?.into_iter().collect();
            shared.retain(|root| roots.contains(root));
        }
        let mut roots: Vec<_> = shared.into_iter().collect();
        roots.sort_unstable();
        Ok(roots)
    }

    /// Element referenced by the fewest links, as the cheapest place to start
    /// an upward walk.
    fn rarest(&self, elements: &[LinkId]) -> Result<Option<LinkId>> {
        let mut best: Option<(u64, LinkId)> = None;
        for &element in elements {
            let usage = self.store.count(Some(element), None)? + self.store.count(None, Some(element))?;
            if best.map_or(true, |(fewest, _)| usage < fewest) {
                best = Some((usage, element));
            }
        }
        Ok(best.map(|(_, element)| element))
    }

    /// Roots of all sequences holding `element` directly, in id order.
    ///
    /// Walks from `element` up through every body pair referencing it, on
    /// either side, and stops at roots.
    fn containing_roots(&self, element: LinkId) -> Result<Vec<LinkId>> {
        let mut visited = FxHashSet::default();
        visited.insert(element);
        let mut roots = FxHashSet::default();
        let mut stack = vec![element];
        let mut parents = Vec::new();

        while let Some(node) = stack.pop() {
            parents.clear();
            let mut gather = |link: Link| {
                parents.push(link);
                ControlFlow::Continue(())
            };
            self.store.each(Some(node), None, &mut gather)?;
            self.store.each(None, Some(node), &mut gather)?;

            for link in &parents {
                if link.is_point() {
                    continue;
                }
                if link.source == self.marker {
                    roots.insert(link.id);
                } else if visited.insert(link.id) {
                    stack.push(link.id);
                }
            }
        }

        let mut roots: Vec<_> = roots.into_iter().collect();
        roots.sort_unstable();
        Ok(roots)
    }

    fn all_roots(&self) -> Result<Vec<LinkId>> {
        let mut roots = Vec::new();
        self.store.each(Some(self.marker), None, |link| {
            if link.id != self.marker {
                roots.push(link.id);
            }
            ControlFlow::Continue(())
        })?;
        roots.sort_unstable();
        Ok(roots)
    }
}
