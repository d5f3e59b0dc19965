//! The doublet link store.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::types::{DoubletError, Link, LinkId, Result};

use super::header::Header;
use super::layout::{read_field, region_len, write_field, NodeStore, RECORD_SIZE, SOURCE, TARGET};
use super::memory::{FileMemory, HeapMemory, LinkMemory};
use super::options::StoreOptions;
use super::tree::{Key, TreeLayout, BY_SOURCE, BY_TARGET};

/// Links gathered per lock acquisition while enumerating.
const EACH_BATCH: usize = 64;

/// Append-only store of `(source, target)` doublets with lookup indexes on
/// both sides.
///
/// Every operation takes the store lock for its duration. [`LinkStore::each`]
/// releases it between batches and while the visitor runs, so visitors may
/// call back into the store, including creating links.
pub struct LinkStore {
    arena: Mutex<Option<LinkArena>>,
    path: Option<PathBuf>,
    sync_on_dispose: bool,
}

struct LinkArena {
    memory: Box<dyn LinkMemory>,
    header: Header,
    max_capacity: u64,
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    Start,
    AfterKey(Key),
    AfterId(LinkId),
    Done,
}

impl NodeStore for LinkArena {
    fn field(&self, id: LinkId, offset: usize) -> u64 {
        read_field(self.memory.bytes(), id, offset)
    }

    fn set_field(&mut self, id: LinkId, offset: usize, value: u64) {
        write_field(self.memory.bytes_mut(), id, offset, value)
    }
}

impl LinkArena {
    fn open(mut memory: Box<dyn LinkMemory>, max_capacity: u64) -> Result<Self> {
        let slots = (memory.bytes().len() / RECORD_SIZE) as u64;
        if slots < 2 {
            return Err(DoubletError::corruption("link region too small"));
        }
        let header = match Header::read(&memory.bytes()[..RECORD_SIZE])? {
            Some(header) => {
                if header.capacity + 1 > slots {
                    return Err(DoubletError::corruption(format!(
                        "header capacity {} exceeds region of {} slots",
                        header.capacity, slots
                    )));
                }
                header
            }
            None => {
                let header = Header::new(slots - 1);
                header.write(&mut memory.bytes_mut()[..RECORD_SIZE])?;
                header
            }
        };
        Ok(Self {
            memory,
            header,
            max_capacity,
        })
    }

    fn contains(&self, id: LinkId) -> bool {
        id != 0 && id <= self.header.count
    }

    fn link(&self, id: LinkId) -> Link {
        Link::new(id, self.field(id, SOURCE), self.field(id, TARGET))
    }

    fn store_header(&mut self) -> Result<()> {
        let header = self.header.clone();
        header.write(&mut self.memory.bytes_mut()[..RECORD_SIZE])
    }

    /// Doubles the region when every slot is taken. Runs before any record
    /// bytes are touched.
    fn reserve_one(&mut self) -> Result<()> {
        if self.header.count < self.header.capacity {
            return Ok(());
        }
        if self.header.capacity >= self.max_capacity {
            return Err(DoubletError::Capacity("link store reached its maximum capacity"));
        }
        let capacity = self
            .header
            .capacity
            .saturating_mul(2)
            .min(self.max_capacity);
        let len = region_len(capacity)
            .ok_or(DoubletError::Capacity("link region size overflows the address space"))?;
        self.memory.grow(len)?;
        self.header.capacity = capacity;
        self.store_header()?;
        info!(capacity, "links.grow");
        Ok(())
    }

    /// Allocates the next id, writes its fields and links it into both
    /// indexes. `None` for either side means the new id itself.
    fn allocate(&mut self, source: Option<LinkId>, target: Option<LinkId>) -> Result<LinkId> {
        self.reserve_one()?;
        let id = self.header.count + 1;
        self.set_field(id, SOURCE, source.unwrap_or(id));
        self.set_field(id, TARGET, target.unwrap_or(id));

        let mut source_root = self.header.source_root;
        BY_SOURCE.insert(self, &mut source_root, id);
        let mut target_root = self.header.target_root;
        BY_TARGET.insert(self, &mut target_root, id);

        self.header.source_root = source_root;
        self.header.target_root = target_root;
        self.header.count = id;
        self.store_header()?;
        Ok(id)
    }

    fn search(&self, source: LinkId, target: LinkId) -> Option<LinkId> {
        BY_SOURCE.find(self, self.header.source_root, source, target)
    }

    fn count(&self, source: Option<LinkId>, target: Option<LinkId>) -> u64 {
        match (source, target) {
            (None, None) => self.header.count,
            (Some(s), None) => BY_SOURCE.count_primary(self, self.header.source_root, s),
            (None, Some(t)) => BY_TARGET.count_primary(self, self.header.target_root, t),
            (Some(s), Some(t)) => u64::from(self.search(s, t).is_some()),
        }
    }

    fn collect(
        &self,
        source: Option<LinkId>,
        target: Option<LinkId>,
        cursor: Cursor,
        out: &mut Vec<Link>,
    ) -> Cursor {
        match (source, target) {
            (Some(s), Some(t)) => {
                if let (Cursor::Start, Some(id)) = (cursor, self.search(s, t)) {
                    out.push(self.link(id));
                }
                Cursor::Done
            }
            (None, None) => {
                let first = match cursor {
                    Cursor::Start => 1,
                    Cursor::AfterId(id) => id + 1,
                    _ => return Cursor::Done,
                };
                let last = (first + EACH_BATCH as u64 - 1).min(self.header.count);
                out.extend((first..=last).map(|id| self.link(id)));
                if last >= self.header.count {
                    Cursor::Done
                } else {
                    Cursor::AfterId(last)
                }
            }
            (Some(s), None) => self.collect_tree(BY_SOURCE, self.header.source_root, s, cursor, out),
            (None, Some(t)) => self.collect_tree(BY_TARGET, self.header.target_root, t, cursor, out),
        }
    }

    fn collect_tree(
        &self,
        tree: TreeLayout,
        root: LinkId,
        primary: u64,
        cursor: Cursor,
        out: &mut Vec<Link>,
    ) -> Cursor {
        let mut next = match cursor {
            Cursor::Start => tree.lower_bound(self, root, (primary, 0, 0)),
            Cursor::AfterKey(key) => tree.upper_bound(self, root, key),
            _ => None,
        };
        while let Some(node) = next {
            let key = tree.key(self, node);
            if key.0 != primary {
                break;
            }
            out.push(self.link(node));
            if out.len() == EACH_BATCH {
                return Cursor::AfterKey(key);
            }
            next = tree.successor(self, node);
        }
        Cursor::Done
    }

    fn verify(&self) -> Result<()> {
        let count = self.header.count;
        for (name, tree, root) in [
            ("source", BY_SOURCE, self.header.source_root),
            ("target", BY_TARGET, self.header.target_root),
        ] {
            let indexed = tree
                .verify(self, root)
                .map_err(|e| DoubletError::corruption(format!("{name} index: {e}")))?;
            if indexed != count {
                return Err(DoubletError::corruption(format!(
                    "{name} index holds {indexed} links, store holds {count}"
                )));
            }
        }
        for id in 1..=count {
            let link = self.link(id);
            if !self.contains(link.source) || !self.contains(link.target) {
                return Err(DoubletError::corruption(format!(
                    "link {link} references a missing link"
                )));
            }
        }
        Ok(())
    }
}

impl LinkStore {
    /// Opens a store, creating the backing file when it does not exist yet.
    pub fn open(options: StoreOptions) -> Result<Self> {
        let initial = options.initial_capacity.max(1);
        let max_capacity = options.max_capacity.unwrap_or(u64::MAX).max(initial);
        let min_len = region_len(initial)
            .ok_or(DoubletError::Capacity("initial capacity overflows the address space"))?;

        let memory: Box<dyn LinkMemory> = match &options.path {
            Some(path) => Box::new(FileMemory::open(path, min_len)?),
            None => Box::new(HeapMemory::new(min_len)),
        };
        let arena = LinkArena::open(memory, max_capacity)?;
        info!(
            path = ?options.path,
            links = arena.header.count,
            capacity = arena.header.capacity,
            "links.open"
        );

        Ok(Self {
            arena: Mutex::new(Some(arena)),
            path: options.path,
            sync_on_dispose: options.sync_on_dispose,
        })
    }

    /// Opens a volatile store with default options.
    pub fn in_memory() -> Result<Self> {
        Self::open(StoreOptions::in_memory())
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read<T>(&self, f: impl FnOnce(&LinkArena) -> Result<T>) -> Result<T> {
        let guard = self.arena.lock();
        let arena = guard.as_ref().ok_or(DoubletError::Disposed)?;
        f(arena)
    }

    fn write<T>(&self, f: impl FnOnce(&mut LinkArena) -> Result<T>) -> Result<T> {
        let mut guard = self.arena.lock();
        let arena = guard.as_mut().ok_or(DoubletError::Disposed)?;
        f(arena)
    }

    /// Allocates a fresh point (a link referencing itself on both sides).
    pub fn create_point(&self) -> Result<LinkId> {
        self.write(|arena| arena.allocate(None, None))
    }

    /// Returns the link `(source, target)`, creating it when absent.
    pub fn get_or_create(&self, source: LinkId, target: LinkId) -> Result<LinkId> {
        self.write(|arena| {
            for side in [source, target] {
                if !arena.contains(side) {
                    return Err(DoubletError::NotFound(side));
                }
            }
            match arena.search(source, target) {
                Some(id) => Ok(id),
                None => arena.allocate(Some(source), Some(target)),
            }
        })
    }

    /// Id of the link `(source, target)` without creating it.
    pub fn search(&self, source: LinkId, target: LinkId) -> Result<Option<LinkId>> {
        self.read(|arena| Ok(arena.search(source, target)))
    }

    /// Whether `id` names an allocated link.
    pub fn exists(&self, id: LinkId) -> Result<bool> {
        self.read(|arena| Ok(arena.contains(id)))
    }

    /// Reads one link.
    pub fn get(&self, id: LinkId) -> Result<Link> {
        self.read(|arena| {
            if arena.contains(id) {
                Ok(arena.link(id))
            } else {
                Err(DoubletError::NotFound(id))
            }
        })
    }

    /// Number of links matching the pattern; `None` matches any id.
    pub fn count(&self, source: Option<LinkId>, target: Option<LinkId>) -> Result<u64> {
        self.read(|arena| Ok(arena.count(source, target)))
    }

    /// Number of allocated links, which is also the highest allocated id.
    pub fn len(&self) -> Result<u64> {
        self.read(|arena| Ok(arena.header.count))
    }

    /// Whether no link has been allocated yet.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Visits every link matching the pattern; `None` matches any id.
    ///
    /// Links with a fixed source (target) arrive ordered by target (source),
    /// a full scan arrives in id order. Returns `Break` when the visitor
    /// stopped the enumeration.
    pub fn each<F>(
        &self,
        source: Option<LinkId>,
        target: Option<LinkId>,
        mut visitor: F,
    ) -> Result<ControlFlow<()>>
    where
        F: FnMut(Link) -> ControlFlow<()>,
    {
        let mut cursor = Cursor::Start;
        let mut batch = Vec::with_capacity(EACH_BATCH);
        loop {
            cursor = self.read(|arena| Ok(arena.collect(source, target, cursor, &mut batch)))?;
            for link in batch.drain(..) {
                if visitor(link).is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
            if matches!(cursor, Cursor::Done) {
                return Ok(ControlFlow::Continue(()));
            }
        }
    }

    /// Writes dirty pages of a file-backed store to disk.
    pub fn flush(&self) -> Result<()> {
        self.write(|arena| arena.memory.flush())
    }

    /// Checks both index trees and every record's references.
    pub fn verify(&self) -> Result<()> {
        self.read(|arena| arena.verify())
    }

    /// Flushes and releases the backing memory. Every later call fails with
    /// [`DoubletError::Disposed`].
    pub fn dispose(&self) -> Result<()> {
        let arena = self.arena.lock().take().ok_or(DoubletError::Disposed)?;
        let mut memory = arena.memory;
        if self.sync_on_dispose {
            memory.flush()?;
        }
        drop(memory);
        debug!(path = ?self.path, "links.disposed");
        Ok(())
    }

    /// Whether [`LinkStore::dispose`] already ran.
    pub fn is_disposed(&self) -> bool {
        self.arena.lock().is_none()
    }
}

impl Drop for LinkStore {
    fn drop(&mut self) {
        if let Some(mut arena) = self.arena.get_mut().take() {
            if let Err(err) = arena.memory.flush() {
                warn!(error = %err, "links.drop.flush_failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> LinkStore {
        LinkStore::open(StoreOptions::in_memory().initial_capacity(4)).unwrap()
    }

    #[test]
    fn points_and_pairs() {
        let store = small();
        let a = store.create_point().unwrap();
        let b = store.create_point().unwrap();
        assert_eq!((a, b), (1, 2));
        assert!(store.get(a).unwrap().is_point());

        let ab = store.get_or_create(a, b).unwrap();
        assert_eq!(store.get_or_create(a, b).unwrap(), ab);
        assert_eq!(store.search(a, b).unwrap(), Some(ab));
        assert_eq!(store.search(b, a).unwrap(), None);
        assert_eq!(store.get(ab).unwrap(), Link::new(ab, a, b));
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn missing_references_are_rejected() {
        let store = small();
        let a = store.create_point().unwrap();
        assert!(matches!(
            store.get_or_create(a, 9),
            Err(DoubletError::NotFound(9))
        ));
        assert!(matches!(store.get(0), Err(DoubletError::NotFound(0))));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn growth_doubles_and_keeps_indexes() {
        let store = small();
        let points: Vec<_> = (0..10).map(|_| store.create_point().unwrap()).collect();
        for &s in &points {
            for &t in &points[..5] {
                store.get_or_create(s, t).unwrap();
            }
        }
        store.verify().unwrap();
        // Pairs of a point with itself resolve to the point.
        assert_eq!(store.len().unwrap(), 55);
        assert_eq!(store.count(Some(points[3]), None).unwrap(), 5);
        assert_eq!(store.count(None, Some(points[0])).unwrap(), 10);
        assert_eq!(store.count(None, Some(points[9])).unwrap(), 1);
    }

    #[test]
    fn capacity_limit_leaves_store_intact() {
        let store =
            LinkStore::open(StoreOptions::in_memory().initial_capacity(2).max_capacity(3)).unwrap();
        for _ in 0..3 {
            store.create_point().unwrap();
        }
        assert!(matches!(store.create_point(), Err(DoubletError::Capacity(_))));
        assert_eq!(store.len().unwrap(), 3);
        store.verify().unwrap();
    }

    #[test]
    fn each_spans_batches_in_key_order() {
        let store = small();
        let hub = store.create_point().unwrap();
        let leaves: Vec<_> = (0..150).map(|_| store.create_point().unwrap()).collect();
        for &leaf in leaves.iter().rev() {
            store.get_or_create(hub, leaf).unwrap();
        }

        let mut targets = Vec::new();
        store
            .each(Some(hub), None, |link| {
                if link.target != hub {
                    targets.push(link.target);
                }
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(targets, leaves);

        let mut all = 0;
        store
            .each(None, None, |_| {
                all += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(all, store.len().unwrap());
    }

    #[test]
    fn each_stops_on_break() {
        let store = small();
        let hub = store.create_point().unwrap();
        for _ in 0..10 {
            let leaf = store.create_point().unwrap();
            store.get_or_create(leaf, hub).unwrap();
        }
        let mut seen = 0;
        let flow = store
            .each(None, Some(hub), |_| {
                seen += 1;
                if seen == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert!(flow.is_break());
        assert_eq!(seen, 3);
    }

    #[test]
    fn visitor_may_create_links() {
        let store = small();
        let hub = store.create_point().unwrap();
        let leaves: Vec<_> = (0..5).map(|_| store.create_point().unwrap()).collect();
        for &leaf in &leaves {
            store.get_or_create(hub, leaf).unwrap();
        }
        store
            .each(Some(hub), None, |link| {
                store.get_or_create(link.target, hub).unwrap();
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(store.count(None, Some(hub)).unwrap(), 6);
        store.verify().unwrap();
    }

    #[test]
    fn disposed_store_fails_fast() {
        let store = small();
        store.create_point().unwrap();
        store.dispose().unwrap();
        assert!(store.is_disposed());
        assert!(matches!(store.create_point(), Err(DoubletError::Disposed)));
        assert!(matches!(store.len(), Err(DoubletError::Disposed)));
        assert!(matches!(
            store.each(None, None, |_| ControlFlow::Continue(())),
            Err(DoubletError::Disposed)
        ));
        assert!(matches!(store.dispose(), Err(DoubletError::Disposed)));
    }

    #[test]
    fn reopen_preserves_links() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("db.links");
        {
            let store = LinkStore::open(StoreOptions::file(&path).initial_capacity(2))?;
            let a = store.create_point()?;
            let b = store.create_point()?;
            store.get_or_create(a, b)?;
            store.get_or_create(b, a)?;
            store.dispose()?;
        }
        let store = LinkStore::open(StoreOptions::file(&path))?;
        assert_eq!(store.len()?, 4);
        assert_eq!(store.search(2, 1)?, Some(4));
        store.verify()?;
        Ok(())
    }
}
