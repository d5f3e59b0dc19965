//! Doublet storage engine.
//!
//! Fixed-width link records live in one growable region (memory-mapped file
//! or heap buffer). Two threaded AVL trees embedded in the records index the
//! links by source and by target.

mod header;
mod layout;
mod links;
mod memory;
mod options;
mod tree;

pub use layout::RECORD_SIZE;
pub use links::LinkStore;
pub use options::{StoreOptions, DEFAULT_INITIAL_CAPACITY};
