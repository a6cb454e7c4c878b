//! # tristore core
//!
//! Key/value entries, time series and event sequences over any storage
//! engine that implements [`tristore_storage::BackendAdapter`].
//!
//! This crate provides:
//! - Namespace isolation of keys within one backend
//! - A value envelope: pluggable serialization plus optional AES-256-GCM encryption
//! - Time-series decimation and gap detection
//! - Event sequences with replayed point-in-time state
//!
//! ## Example
//!
//! ```rust
//! use tristore_core::{Change, RangeQuery, Store, StoreConfig, Value};
//!
//! let store = Store::open("memory://demo", StoreConfig::new().frozen(false).default_freq(10))?;
//!
//! store.kv().set("site", "north")?;
//!
//! let ts = store.timeseries();
//! ts.extend("temp", [(100, 20.5), (105, 20.7), (110, 21.0)])?;
//! assert_eq!(ts.range("temp", RangeQuery::new())?.len(), 2);
//! assert_eq!(ts.missing("temp", 100, Some(120), None)?, vec![120]);
//!
//! let state = store.events().apply("pump", [("running", Change::from(true))], Some(1))?;
//! assert_eq!(state.unwrap()["running"], Value::from(true));
//! # Ok::<(), tristore_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod crypto;
mod envelope;
mod error;
pub mod events;
mod kv;
mod namespace;
mod store;
pub mod timeseries;

pub use config::{StoreConfig, DEFAULT_NAMESPACE};
pub use crypto::EncryptionKey;
pub use envelope::{CborSerializer, JsonSerializer, ValueEnvelope, ValueSerializer};
pub use error::{CoreError, CoreResult};
pub use events::{Change, EvalError, Event, EventQuery, EventSequences, Operator, State};
pub use kv::KeyValue;
pub use namespace::NamespaceCodec;
pub use store::Store;
pub use timeseries::{Point, RangeQuery, TimeSeries};
pub use tristore_codec::Value;
pub use tristore_storage::{BackendAdapter, BackendRegistry};
