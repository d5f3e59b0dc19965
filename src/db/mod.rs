//! Database bootstrap: opens the store, lays down the code-unit atoms and the
//! markers, and wires the codecs that work on top of them.

mod markers;

pub use markers::{PAGE_MARKER, SEQUENCE_MARKER};

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::pages::PageArchive;
use crate::sequences::SequenceCodec;
use crate::storage::{LinkStore, StoreOptions};
use crate::types::Result;
use crate::unicode;

use markers::allocate_marker;

/// An initialized link store together with its sequence codec and page
/// archive.
pub struct Database {
    store: Arc<LinkStore>,
    sequences: SequenceCodec,
    pages: PageArchive,
}

impl Database {
    /// Opens (or creates) a database. Reopening verifies that the atoms and
    /// markers sit at their fixed ids.
    pub fn open(options: StoreOptions) -> Result<Self> {
        let store = Arc::new(LinkStore::open(options)?);
        unicode::init(&store)?;
        let page_marker = allocate_marker(&store, "page marker", PAGE_MARKER)?;
        let sequence_marker = allocate_marker(&store, "sequence marker", SEQUENCE_MARKER)?;

        let sequences = SequenceCodec::new(Arc::clone(&store), sequence_marker);
        let pages = PageArchive::new(sequences.clone(), page_marker);
        info!(
            path = ?store.path(),
            links = store.len()?,
            "db.open"
        );
        Ok(Self {
            store,
            sequences,
            pages,
        })
    }

    /// Opens a heap-backed database.
    pub fn in_memory() -> Result<Self> {
        Self::open(StoreOptions::in_memory())
    }

    /// The underlying link store.
    pub fn store(&self) -> &Arc<LinkStore> {
        &self.store
    }

    /// Codec for sequences under the sequence marker.
    pub fn sequences(&self) -> &SequenceCodec {
        &self.sequences
    }

    /// Archive of crawled pages.
    pub fn pages(&self) -> &PageArchive {
        &self.pages
    }

    /// Flushes and releases the store.
    pub fn dispose(&self) -> Result<()> {
        self.store.dispose()?;
        info!(path = ?self.store.path(), "db.disposed");
        Ok(())
    }

    /// Whether the store was released.
    pub fn is_disposed(&self) -> bool {
        self.store.is_disposed()
    }

    /// Deletes the backing file of a released database. A missing file is
    /// not an error.
    pub fn destroy(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "db.destroyed");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
