//! doubletdb: a doublet (associative link) store with sequence encoding, a
//! page archive built on top of it, a crawler and a text search.
//!
//! Everything is stored as links `(id, source, target)` in one memory-mapped
//! file. Text is kept as balanced trees of links over 65 536 code-unit atoms;
//! archived pages are nested doublets of page marker, uri, timestamp and
//! content.

#![warn(missing_docs)]

pub mod concurrency;
pub mod config;
pub mod crawler;
pub mod db;
pub mod logging;
pub mod pages;
pub mod protocol;
pub mod search;
pub mod sequences;
pub mod service;
pub mod storage;
pub mod types;
pub mod unicode;

pub use config::{Config, ConfigError};
pub use db::Database;
pub use pages::PageArchive;
pub use protocol::ProtocolHandler;
pub use search::{SearchEngine, SearchHit, SearchSummary};
pub use sequences::{SequenceCodec, Term};
pub use service::{Request, Response, Service, ServiceEvent, ServiceOptions, Supervisor};
pub use storage::{LinkStore, StoreOptions};
pub use types::{DoubletError, Link, LinkId, Result};
