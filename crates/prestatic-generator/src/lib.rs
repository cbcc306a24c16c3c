//! Prestatic Generator Library
//!
//! Turns collection and singleton entries into importable ES modules,
//! recompiling only entries whose fingerprint changed.
//!
//! # Modules
//!
//! - [`walker`] - Schema-driven traversal of entry values
//! - [`fingerprint`] - Entry fingerprints and the module cache reader
//! - [`sanitize`] - Identifiers for aggregate import bindings
//! - [`module`] - ES module rendering
//! - [`emit`] - Atomic module writes and pruning
//! - [`store`] - Entry storage backends
//! - [`build`] - Build orchestration
//! - [`check`] - Dry-run validation

pub mod build;
pub mod check;
pub mod emit;
pub mod fingerprint;
pub mod module;
pub mod sanitize;
pub mod store;
pub mod walker;

pub use build::{BuildError, BuildStats, Builder, EntryError, ScopeStats};
pub use check::{CheckReport, Issue, Severity};
pub use emit::{EmitError, Emitter};
pub use fingerprint::{CacheError, Fingerprint, Fingerprinter, read_fingerprint};
pub use sanitize::{IdentifierAllocator, sanitize};
pub use store::{EntryStore, FsEntryStore, ReadOptions, StoreError};
pub use walker::{FormLeaf, WalkError, walk};
