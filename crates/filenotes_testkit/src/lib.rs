//! # Filenotes Testkit
//!
//! Test utilities for filenotes replication.
//!
//! This crate provides:
//! - A throwaway workspace with a notes directory, an in-memory remote and
//!   in-memory settings
//! - Property-based generators for local/remote file tables
//!
//! ## Usage
//!
//! ```rust,ignore
//! use filenotes_testkit::prelude::*;
//!
//! #[test]
//! fn downloads_missing_file() {
//!     let ws = TestWorkspace::new();
//!     ws.write_remote("a.txt", "hello", at(100));
//!     assert!(ws.replicator().invoke().is_completed());
//!     assert_eq!(ws.local_names(), vec!["a.txt"]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
