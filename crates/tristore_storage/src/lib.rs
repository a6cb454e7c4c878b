//! # tristore storage
//!
//! The primitive operations every storage engine provides to tristore, and
//! the engines themselves.
//!
//! Engines store opaque bytes under already-namespaced keys. They know
//! nothing about value serialization, decimation or event replay; that all
//! lives in `tristore_core`, written once against [`BackendAdapter`].
//!
//! ## Available Engines
//!
//! - [`InMemoryAdapter`] - ephemeral tables shared through a [`MemoryEngine`]
//! - [`JournalAdapter`] - embedded append-only journal file
//! - `SqliteAdapter` - relational tables in SQLite (feature `sqlite`)
//!
//! Adapters are usually built from a connection string through
//! [`BackendRegistry`].
//!
//! ## Example
//!
//! ```rust
//! use tristore_storage::{BackendAdapter, BackendRegistry};
//!
//! let registry = BackendRegistry::with_defaults();
//! let mut adapter = registry.create("memory://demo", "default:").unwrap();
//! adapter.open(false).unwrap();
//! adapter.ts_extend("default:temp", &[(10, b"a".to_vec()), (20, b"b".to_vec())]).unwrap();
//! assert_eq!(adapter.ts_first("default:temp").unwrap(), Some(10));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod journal;
mod memory;
mod registry;
#[cfg(feature = "sqlite")]
mod sqlite;
mod tables;

pub use backend::{BackendAdapter, EventKey, RawChange, RawChanges, RawEvent, RawPoint};
pub use error::{StorageError, StorageResult};
pub use journal::JournalAdapter;
pub use memory::{InMemoryAdapter, MemoryEngine};
pub use registry::{AdapterFactory, BackendRegistry};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAdapter;
