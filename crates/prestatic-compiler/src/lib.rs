//! Prestatic Compiler Library
//!
//! Content compilers turn the raw markup of a content field into a
//! [`CompiledArtifact`] that can be serialized into a generated module.
//!
//! # Modules
//!
//! - [`markdown`] - Markdown compiler built on pulldown-cmark
//! - [`syntax`] - Syntax highlighting for fenced code blocks

pub mod markdown;
pub mod syntax;

use std::path::Path;

pub use markdown::MarkdownCompiler;
use prestatic_core::{EntryPath, config::OutputFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
pub use syntax::SyntaxHighlighter;
use thiserror::Error;

/// Compiler errors.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Raw HTML was found while raw HTML is disabled.
    #[error("raw HTML is not allowed in content: {snippet}")]
    RawHtml { snippet: String },

    /// The compiler cannot produce the requested format.
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Failure reported by a custom compiler.
    #[error("{0}")]
    Failed(String),

    /// The artifact could not be converted into a JSON value.
    #[error("artifact serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CompileError {
    /// Create an error for a custom compiler failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result type for compiler operations.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Where the content being compiled came from.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    /// Location of the content field inside its entry.
    pub path: &'a EntryPath,

    /// Id of the entry that owns the field.
    pub slug: &'a str,

    /// Directory of the collection or singleton, for relative references.
    pub base_path: &'a Path,
}

/// Table of contents entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Heading level (1-6).
    pub level: u8,

    /// Heading text.
    pub text: String,

    /// Anchor ID for linking.
    pub id: String,
}

/// Metadata produced alongside compiled content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactData {
    /// Representation of `value`.
    pub format: OutputFormat,

    /// Headings in document order.
    #[serde(default)]
    pub toc: Vec<TocEntry>,
}

/// Compiled form of one content field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledArtifact {
    /// Compiled content.
    pub value: String,

    /// Metadata about the compiled content.
    pub data: ArtifactData,
}

impl CompiledArtifact {
    /// The `{ value, data }` object stored in place of the raw content.
    pub fn into_value(self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Trait for content compilers.
pub trait ContentCompiler: Send + Sync {
    /// Compile raw markup into an artifact.
    fn compile(&self, raw: &str, ctx: &CompileContext<'_>) -> Result<CompiledArtifact>;

    /// Name and options of this compiler.
    ///
    /// Folded into entry fingerprints so that changing compiler settings
    /// invalidates previously generated modules.
    fn identity(&self) -> String;
}

/// Adapts a closure into a [`ContentCompiler`].
pub struct FnCompiler<F> {
    name: String,
    compile: F,
}

impl<F> FnCompiler<F>
where
    F: Fn(&str, &CompileContext<'_>) -> Result<CompiledArtifact> + Send + Sync,
{
    /// Wrap `compile` under the identity `name`.
    pub fn new(name: impl Into<String>, compile: F) -> Self {
        Self {
            name: name.into(),
            compile,
        }
    }
}

impl<F> ContentCompiler for FnCompiler<F>
where
    F: Fn(&str, &CompileContext<'_>) -> Result<CompiledArtifact> + Send + Sync,
{
    fn compile(&self, raw: &str, ctx: &CompileContext<'_>) -> Result<CompiledArtifact> {
        (self.compile)(raw, ctx)
    }

    fn identity(&self) -> String {
        self.name.clone()
    }
}

impl std::fmt::Debug for dyn ContentCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCompiler")
            .field("identity", &self.identity())
            .finish()
    }
}
