//! # tristore testkit
//!
//! Test utilities for tristore.
//!
//! This crate provides:
//! - Store fixtures for every built-in backend, over temporary directories
//! - Property-based test generators using proptest
//! - A concurrent writer harness for the event timestamp guarantee
//!
//! The conformance tests under `tests/` run the same scenarios against
//! every backend.
//!
//! ## Usage
//!
//! ```rust
//! use tristore_testkit::for_each_backend;
//!
//! for_each_backend(|stores| {
//!     let store = stores.writable();
//!     store.kv().set("k", 1).unwrap();
//!     assert!(store.kv().has("k").unwrap());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
