//! Archive of crawled pages.
//!
//! A page record is `(page_marker, (uri, (timestamp, content)))` where the
//! three inner elements are text sequences and the timestamp is RFC 3339 in
//! UTC with second precision. The page id is the id of the outer link.

use std::ops::ControlFlow;

use rustc_hash::FxHashSet;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, trace};
use url::Url;

use crate::sequences::SequenceCodec;
use crate::storage::LinkStore;
use crate::types::{DoubletError, Link, LinkId, Result};
use crate::unicode;

/// Reads and writes page records.
#[derive(Clone)]
pub struct PageArchive {
    sequences: SequenceCodec,
    page_marker: LinkId,
}

/// The links making up one page record.
struct PageParts {
    uri: LinkId,
    timestamp: LinkId,
    content: LinkId,
}

impl PageArchive {
    /// Creates an archive tagging records with `page_marker`.
    pub fn new(sequences: SequenceCodec, page_marker: LinkId) -> Self {
        Self {
            sequences,
            page_marker,
        }
    }

    /// The page marker.
    pub fn page_marker(&self) -> LinkId {
        self.page_marker
    }

    fn store(&self) -> &LinkStore {
        self.sequences.store()
    }

    /// Stores one crawl of `uri` and returns the page id. Saving identical
    /// data twice yields the same id.
    ///
    /// Empty content is rejected with [`DoubletError::Invalid`]. Such a page
    /// leaves no crawl time behind, so [`PageArchive::max_crawled_timestamp`]
    /// keeps reporting the epoch and every crawl fetches it again.
    pub fn save(&self, uri: &str, timestamp: OffsetDateTime, content: &str) -> Result<LinkId> {
        if uri.is_empty() {
            return Err(DoubletError::invalid("page uri must not be empty"));
        }
        if content.is_empty() {
            return Err(DoubletError::invalid(format!("page {uri} has no content")));
        }
        let uri_seq = self.sequences.create(&unicode::encode(uri))?;
        let stamp_seq = self.sequences.create(&unicode::encode(&format_timestamp(timestamp)?))?;
        let content_seq = self.sequences.create(&unicode::encode(content))?;

        let store = self.store();
        let details = store.get_or_create(stamp_seq, content_seq)?;
        let body = store.get_or_create(uri_seq, details)?;
        let page = store.get_or_create(self.page_marker, body)?;
        debug!(page, uri, bytes = content.len(), "pages.saved");
        Ok(page)
    }

    /// Splits a page record, or `None` when `page` is not one.
    fn parts(&self, page: LinkId) -> Result<Option<PageParts>> {
        let store = self.store();
        if !store.exists(page)? {
            return Ok(None);
        }
        let outer = store.get(page)?;
        if outer.source != self.page_marker || outer.is_point() {
            return Ok(None);
        }
        let body = store.get(outer.target)?;
        let details = store.get(body.target)?;
        for id in [body.source, details.source, details.target] {
            if !self.sequences.is_sequence(id)? {
                return Ok(None);
            }
        }
        Ok(Some(PageParts {
            uri: body.source,
            timestamp: details.source,
            content: details.target,
        }))
    }

    fn text(&self, root: LinkId) -> Result<String> {
        unicode::decode(&self.sequences.decode(root)?)
    }

    /// Page records of `uri`, in body-link order.
    fn records_of(&self, uri: &str) -> Result<Vec<(LinkId, PageParts)>> {
        let Some(uri_seq) = self.sequences.find(&unicode::encode(uri))? else {
            return Ok(Vec::new());
        };
        let mut bodies: Vec<Link> = Vec::new();
        self.store().each(Some(uri_seq), None, |link| {
            if !link.is_point() {
                bodies.push(link);
            }
            ControlFlow::Continue(())
        })?;

        let mut records = Vec::new();
        for body in bodies {
            if let Some(page) = self.store().search(self.page_marker, body.id)? {
                if let Some(parts) = self.parts(page)? {
                    records.push((page, parts));
                }
            }
        }
        Ok(records)
    }

    /// Latest crawl time of `uri`, or the Unix epoch when it was never
    /// crawled. Does not create anything.
    pub fn max_crawled_timestamp(&self, uri: &str) -> Result<OffsetDateTime> {
        let mut latest = OffsetDateTime::UNIX_EPOCH;
        for (_, parts) in self.records_of(uri)? {
            let crawled = parse_timestamp(&self.text(parts.timestamp)?)?;
            latest = latest.max(crawled);
        }
        Ok(latest)
    }

    /// Uri of a page record. `None` when `page` is not a page record or its
    /// uri is not an absolute URL.
    pub fn load_uri(&self, page: LinkId) -> Result<Option<String>> {
        let Some(parts) = self.parts(page)? else {
            return Ok(None);
        };
        let text = self.text(parts.uri)?;
        Ok(Url::parse(&text).is_ok().then_some(text))
    }

    /// Crawl time of a page record.
    pub fn load_timestamp(&self, page: LinkId) -> Result<Option<OffsetDateTime>> {
        match self.parts(page)? {
            Some(parts) => parse_timestamp(&self.text(parts.timestamp)?).map(Some),
            None => Ok(None),
        }
    }

    /// Content of the first stored record of `uri`.
    pub fn load_content(&self, uri: &str) -> Result<Option<String>> {
        match self.records_of(uri)?.into_iter().next() {
            Some((_, parts)) => self.text(parts.content).map(Some),
            None => Ok(None),
        }
    }

    /// Number of page records.
    pub fn page_count(&self) -> Result<u64> {
        // The marker point itself also has the marker as source.
        Ok(self.store().count(Some(self.page_marker), None)?.saturating_sub(1))
    }

    /// Streams the ids of pages whose uri, timestamp or content contains
    /// `partial`, then calls `on_done` with the number of hits. Each page is
    /// reported once. `on_match` may stop the search.
    pub fn search<M, D>(&self, partial: &str, mut on_match: M, on_done: D) -> Result<usize>
    where
        M: FnMut(LinkId) -> ControlFlow<()>,
        D: FnOnce(usize),
    {
        let run = unicode::encode(partial);
        let mut hits = 0;
        if !run.is_empty() {
            let mut reported = FxHashSet::default();
            self.sequences.find_containing(&run, |root| {
                for page in self.pages_holding(root)? {
                    if !reported.insert(page) {
                        continue;
                    }
                    hits += 1;
                    trace!(page, root, "pages.search.hit");
                    if on_match(page).is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
                Ok(ControlFlow::Continue(()))
            })?;
        }
        on_done(hits);
        Ok(hits)
    }

    /// Page records that use `root` as their uri, timestamp or content.
    fn pages_holding(&self, root: LinkId) -> Result<Vec<LinkId>> {
        let store = self.store();
        // As a uri, `root` is the source of a page body. As a timestamp or
        // content it sits in a `(timestamp, content)` link one level deeper.
        let mut around = Vec::new();
        let mut gather = |link: Link| {
            if !link.is_point() {
                around.push(link.id);
            }
            ControlFlow::Continue(())
        };
        store.each(Some(root), None, &mut gather)?;
        store.each(None, Some(root), &mut gather)?;

        let mut bodies = Vec::new();
        for &link in &around {
            bodies.push(link);
            store.each(None, Some(link), |body| {
                bodies.push(body.id);
                ControlFlow::Continue(())
            })?;
        }

        let mut pages = Vec::new();
        for body in bodies {
            let Some(page) = store.search(self.page_marker, body)? else {
                continue;
            };
            let Some(parts) = self.parts(page)? else {
                continue;
            };
            let holds = parts.uri == root || parts.timestamp == root || parts.content == root;
            if holds && !pages.contains(&page) {
                pages.push(page);
            }
        }
        Ok(pages)
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String> {
    let utc = timestamp.to_offset(UtcOffset::UTC);
    let truncated = utc
        .replace_nanosecond(0)
        .map_err(|e| DoubletError::invalid(e.to_string()))?;
    truncated
        .format(&Rfc3339)
        .map_err(|e| DoubletError::invalid(format!("timestamp {timestamp}: {e}")))
}

fn parse_timestamp(text: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(text, &Rfc3339)
        .map_err(|e| DoubletError::corruption(format!("stored timestamp {text:?}: {e}")))
}
