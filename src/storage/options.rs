use std::path::{Path, PathBuf};

/// Number of link slots a fresh store reserves.
pub const DEFAULT_INITIAL_CAPACITY: u64 = 1 << 17;

/// Configuration options supplied when opening a [`super::LinkStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Backing file; `None` keeps the store on the heap.
    pub path: Option<PathBuf>,
    /// Link slots reserved when the region is first created.
    pub initial_capacity: u64,
    /// Upper bound on link slots; growth beyond it fails with a capacity error.
    pub max_capacity: Option<u64>,
    /// Whether `LinkStore::dispose` syncs the backing file before unmapping.
    pub sync_on_dispose: bool,
}

impl StoreOptions {
    /// Options for a store kept in `path`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::in_memory()
        }
    }

    /// Options for a volatile, heap-backed store.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_capacity: None,
            sync_on_dispose: true,
        }
    }

    /// Sets the number of slots reserved for a fresh region.
    pub fn initial_capacity(mut self, links: u64) -> Self {
        self.initial_capacity = links.max(1);
        self
    }

    /// Caps the number of link slots.
    pub fn max_capacity(mut self, links: u64) -> Self {
        self.max_capacity = Some(links);
        self
    }

    /// Enables or disables the final sync on dispose.
    pub fn sync_on_dispose(mut self, enabled: bool) -> Self {
        self.sync_on_dispose = enabled;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::in_memory()
    }
}
