//! Prestatic Core Library
//!
//! Core types, field schemas, configuration, and error handling for the prestatic
//! content generator.

pub mod config;
pub mod error;
pub mod frontmatter;
pub mod path;
pub mod schema;

pub use config::Config;
pub use error::{CoreError, Result};
pub use path::EntryPath;
pub use schema::{FieldSchema, FormField, FormKind, Schema};
