//! Build orchestration.
//!
//! Drives every configured collection and singleton through the cache check,
//! schema walk, compilation and module emission.

use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use indexmap::IndexMap;
use prestatic_compiler::{
    CompileContext, CompileError, CompiledArtifact, ContentCompiler, MarkdownCompiler,
};
use prestatic_core::{
    Config, EntryPath,
    config::{ScopeConfig, ScopeKind},
    frontmatter::type_name,
};
use rayon::prelude::*;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    emit::{EmitError, Emitter},
    fingerprint::{Fingerprinter, read_fingerprint},
    module,
    sanitize::IdentifierAllocator,
    store::{EntryStore, FsEntryStore, ReadOptions, StoreError},
    walker::{FormLeaf, WalkError, walk},
};

/// Failure while building one entry.
#[derive(Debug, Error)]
pub enum EntryError {
    /// The entry does not match its schema.
    #[error(transparent)]
    Walk(#[from] WalkError),

    /// A content field failed to compile.
    #[error("compile error at {path}: {source}")]
    Compile {
        path: EntryPath,
        #[source]
        source: CompileError,
    },

    /// The entry could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The entry module could not be written.
    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl EntryError {
    /// Location inside the entry, when the failure has one.
    pub fn path(&self) -> Option<&EntryPath> {
        match self {
            Self::Walk(err) => Some(err.path()),
            Self::Compile { path, .. } => Some(path),
            Self::Store(_) | Self::Emit(_) => None,
        }
    }
}

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// An entry failed to build.
    #[error("{kind} `{name}`, entry `{id}`: {source}")]
    Entry {
        kind: ScopeKind,
        name: String,
        id: String,
        #[source]
        source: EntryError,
    },

    /// IO error on the output root.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Entry listing failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Aggregate emission or pruning failed.
    #[error("emit error: {0}")]
    Emit(#[from] EmitError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Per-scope build counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeStats {
    /// Entries found.
    pub entries: usize,

    /// Entries compiled and written.
    pub compiled: usize,

    /// Entries whose fingerprint matched the existing module.
    pub skipped: usize,

    /// Stale modules removed.
    pub pruned: usize,
}

/// Build statistics.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Collections in configuration order.
    pub collections: IndexMap<String, ScopeStats>,

    /// Singletons in configuration order.
    pub singletons: IndexMap<String, ScopeStats>,

    /// Files written or removed.
    pub writes: usize,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

impl BuildStats {
    /// Stats of every scope, collections first.
    pub fn scopes(&self) -> impl Iterator<Item = (ScopeKind, &str, &ScopeStats)> {
        let collections = self
            .collections
            .iter()
            .map(|(name, s)| (ScopeKind::Collection, name.as_str(), s));
        let singletons = self
            .singletons
            .iter()
            .map(|(name, s)| (ScopeKind::Singleton, name.as_str(), s));
        collections.chain(singletons)
    }

    /// Entries found across all scopes.
    pub fn total_entries(&self) -> usize {
        self.scopes().map(|(_, _, s)| s.entries).sum()
    }

    /// Entries compiled across all scopes.
    pub fn total_compiled(&self) -> usize {
        self.scopes().map(|(_, _, s)| s.compiled).sum()
    }
}

/// What happened to one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Compiled,
    Skipped,
}

/// Everything an entry build needs to know about its scope.
struct ScopeContext<'a> {
    kind: ScopeKind,
    name: &'a str,
    scope: &'a ScopeConfig,
    out_dir: PathBuf,
    base_path: PathBuf,
    fingerprinter: Fingerprinter,
}

/// Content builder that orchestrates the build process.
pub struct Builder {
    config: Config,
    root: PathBuf,
    output_dir: PathBuf,
    compiler: Arc<dyn ContentCompiler>,
    store: Arc<dyn EntryStore>,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("root", &self.root)
            .field("output_dir", &self.output_dir)
            .field("compiler", &self.compiler)
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Create a builder for the project at `root`.
    ///
    /// Entries are read with [`FsEntryStore`] and compiled with a
    /// [`MarkdownCompiler`] configured from `[compiler]`.
    #[must_use]
    pub fn new(config: Config, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let output_dir = root.join(&config.build.output_dir);
        let compiler = Arc::new(MarkdownCompiler::from_config(&config.compiler));
        let store = Arc::new(FsEntryStore::new(root.clone(), config.clone()));

        Self {
            config,
            root,
            output_dir,
            compiler,
            store,
        }
    }

    /// Use a different content compiler.
    #[must_use]
    pub fn with_compiler(mut self, compiler: Arc<dyn ContentCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Use a different entry store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn EntryStore>) -> Self {
        self.store = store;
        self
    }

    /// Override the output root.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// The output root.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The project configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn EntryStore {
        self.store.as_ref()
    }

    /// Execute the full build process.
    pub fn build(&self) -> Result<BuildStats> {
        let start = Instant::now();
        let mut stats = BuildStats::default();

        info!(
            root = %self.root.display(),
            output = %self.output_dir.display(),
            compiler = %self.compiler.identity(),
            "starting build"
        );

        self.config
            .validate()
            .map_err(|e| BuildError::Config(e.to_string()))?;

        fs::create_dir_all(&self.output_dir).map_err(|source| BuildError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let emitter = Emitter::new(&self.output_dir);

        for (kind, name, scope) in self.config.scopes() {
            let scope_stats = self.build_scope(&emitter, kind, name, scope)?;
            let target = match kind {
                ScopeKind::Collection => &mut stats.collections,
                ScopeKind::Singleton => &mut stats.singletons,
            };
            target.insert(name.to_string(), scope_stats);
        }

        stats.writes = emitter.writes();
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            entries = stats.total_entries(),
            compiled = stats.total_compiled(),
            writes = stats.writes,
            duration_ms = stats.duration_ms,
            "build complete"
        );

        Ok(stats)
    }

    /// Remove the output root.
    pub fn clean(&self) -> Result<()> {
        info!(dir = %self.output_dir.display(), "cleaning output directory");
        Emitter::new(&self.output_dir).clean()?;
        Ok(())
    }

    /// Build one collection or singleton and write its aggregate module.
    fn build_scope(
        &self,
        emitter: &Emitter,
        kind: ScopeKind,
        name: &str,
        scope: &ScopeConfig,
    ) -> Result<ScopeStats> {
        let fingerprinter = Fingerprinter::new(&self.compiler.identity(), &scope.schema)
            .map_err(|e| BuildError::Config(format!("{kind} `{name}`: schema: {e}")))?;

        let ctx = ScopeContext {
            kind,
            name,
            scope,
            out_dir: emitter.ensure_scope_dir(kind, name)?,
            base_path: self.root.join(scope.base_path()),
            fingerprinter,
        };

        let ids = match kind {
            ScopeKind::Collection => self.store.list(name)?,
            ScopeKind::Singleton => vec![name.to_string()],
        };
        debug!(%kind, name, count = ids.len(), "processing scope");

        let outcomes = ids
            .par_iter()
            .map(|id| {
                self.build_entry(&ctx, emitter, id)
                    .map_err(|source| BuildError::Entry {
                        kind,
                        name: name.to_string(),
                        id: id.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut stats = ScopeStats {
            entries: ids.len(),
            ..ScopeStats::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Compiled => stats.compiled += 1,
                Outcome::Skipped => stats.skipped += 1,
            }
        }

        if self.config.build.prune {
            let keep: HashSet<&str> = ids.iter().map(String::as_str).collect();
            stats.pruned = emitter.prune(&ctx.out_dir, &keep)?.len();
        }

        let mut idents = IdentifierAllocator::new();
        let index = match kind {
            ScopeKind::Collection => {
                let bindings: Vec<(String, String)> = ids
                    .iter()
                    .map(|id| (id.clone(), idents.allocate(id)))
                    .collect();
                module::render_collection_index(&bindings)
            }
            ScopeKind::Singleton => module::render_singleton_index(name, &idents.allocate(name)),
        };
        // The aggregate is rewritten whenever one of its members was.
        let members_changed = stats.compiled > 0 || stats.pruned > 0;
        emitter.write_index(&ctx.out_dir, &index, members_changed)?;

        info!(
            %kind,
            name,
            entries = stats.entries,
            compiled = stats.compiled,
            skipped = stats.skipped,
            pruned = stats.pruned,
            "scope built"
        );

        Ok(stats)
    }

    /// Read, fingerprint, compile and write one entry.
    fn build_entry(
        &self,
        ctx: &ScopeContext<'_>,
        emitter: &Emitter,
        id: &str,
    ) -> std::result::Result<Outcome, EntryError> {
        let path = Emitter::entry_path(&ctx.out_dir, id)?;

        let options = ReadOptions {
            resolve_linked_files: true,
        };
        let mut entry = match ctx.kind {
            ScopeKind::Collection => self.store.read(ctx.name, id, options)?,
            ScopeKind::Singleton => self.store.read_singleton(ctx.name, options)?,
        };

        let fingerprint = ctx.fingerprinter.fingerprint(&entry);
        match read_fingerprint(&path) {
            Ok(previous) if previous == fingerprint => {
                debug!(kind = %ctx.kind, scope = ctx.name, id, "unchanged, skipping");
                return Ok(Outcome::Skipped);
            }
            Ok(_) => debug!(kind = %ctx.kind, scope = ctx.name, id, "fingerprint changed"),
            Err(e) => debug!(kind = %ctx.kind, scope = ctx.name, id, error = %e, "cache miss"),
        }

        walk(&ctx.scope.schema, &mut entry, &|leaf: FormLeaf<'_>| {
            self.compile_leaf(ctx, id, leaf)
        })?;

        emitter.write_entry(&path, &fingerprint, &entry)?;
        debug!(kind = %ctx.kind, scope = ctx.name, id, "compiled");
        Ok(Outcome::Compiled)
    }

    /// Replace a content leaf with its compiled artifact.
    fn compile_leaf(
        &self,
        ctx: &ScopeContext<'_>,
        id: &str,
        leaf: FormLeaf<'_>,
    ) -> std::result::Result<(), EntryError> {
        if !leaf.field.form_kind.is_content() {
            return Ok(());
        }

        let compiled = match &*leaf.value {
            Value::String(raw) => {
                let compile_ctx = CompileContext {
                    path: &leaf.path,
                    slug: id,
                    base_path: &ctx.base_path,
                };
                self.compiler
                    .compile(raw, &compile_ctx)
                    .and_then(CompiledArtifact::into_value)
                    .map_err(|source| EntryError::Compile {
                        path: leaf.path.clone(),
                        source,
                    })?
            }
            Value::Null => return Ok(()),
            other => {
                return Err(WalkError::SchemaContract {
                    path: leaf.path.clone(),
                    message: format!("content field must be a string, found {}", type_name(other)),
                }
                .into());
            }
        };

        *leaf.value = compiled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use prestatic_compiler::{ArtifactData, CompiledArtifact, FnCompiler};
    use prestatic_core::config::OutputFormat;

    use super::*;

    const CONFIG: &str = r#"
[compiler]
highlight = false

[collections.posts]
path = "content/posts/*"
content_field = "summary"

[collections.posts.schema]
title = { kind = "form", form_kind = "text" }
summary = { kind = "form", form_kind = "content" }

[singletons.home]
path = "content/home"

[singletons.home.schema]
headline = { kind = "form", form_kind = "text" }
"#;

    fn project(files: &[(&str, &str)]) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let home = [("content/home.yaml", "headline: Welcome\n")];
        for (path, content) in home.iter().chain(files) {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(path, content).expect("write");
        }
        (dir, CONFIG.parse().expect("config"))
    }

    #[test]
    fn test_build_and_rebuild_stats() {
        let (dir, config) = project(&[("content/posts/hello.md", "---\ntitle: Hello\n---\n# Hi\n")]);
        let builder = Builder::new(config, dir.path());

        let first = builder.build().expect("first build");
        assert_eq!(
            first.collections["posts"],
            ScopeStats {
                entries: 1,
                compiled: 1,
                skipped: 0,
                pruned: 0
            }
        );
        assert_eq!(first.singletons["home"].compiled, 1);
        // Two entry modules and two aggregates.
        assert_eq!(first.writes, 4);

        let second = builder.build().expect("second build");
        assert_eq!(second.collections["posts"].skipped, 1);
        assert_eq!(second.total_compiled(), 0);
        assert_eq!(second.writes, 0);
    }

    #[test]
    fn test_custom_compiler_is_used() {
        let (dir, config) = project(&[("content/posts/a.json", r#"{ "summary": "x" }"#)]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let compiler = FnCompiler::new("upper", move |raw: &str, ctx: &CompileContext<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert_eq!(ctx.slug, "a");
            Ok(CompiledArtifact {
                value: raw.to_uppercase(),
                data: ArtifactData {
                    format: OutputFormat::Text,
                    toc: Vec::new(),
                },
            })
        });

        let builder = Builder::new(config, dir.path()).with_compiler(Arc::new(compiler));
        builder.build().expect("build");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let module = fs::read_to_string(builder.output_dir().join("collections/posts/a.mjs"))
            .expect("read module");
        assert!(module.contains("\"value\": \"X\""));
    }

    #[test]
    fn test_non_string_content_is_contract_violation() {
        let (dir, config) = project(&[("content/posts/a.json", r#"{ "summary": 3 }"#)]);
        let err = Builder::new(config, dir.path())
            .build()
            .expect_err("number content");

        let BuildError::Entry {
            kind,
            name,
            id,
            source,
        } = err
        else {
            panic!("expected an entry error");
        };
        assert_eq!(kind, ScopeKind::Collection);
        assert_eq!(name, "posts");
        assert_eq!(id, "a");
        assert!(matches!(source, EntryError::Walk(WalkError::SchemaContract { .. })));
        assert_eq!(source.path().map(ToString::to_string).as_deref(), Some("summary"));
    }

    #[test]
    fn test_null_content_is_left_alone() {
        let (dir, config) = project(&[(
            "content/posts/a.json",
            r#"{ "title": "T", "summary": null }"#,
        )]);
        let builder = Builder::new(config, dir.path());
        builder.build().expect("build");

        let module = fs::read_to_string(builder.output_dir().join("collections/posts/a.mjs"))
            .expect("read module");
        assert!(module.contains("\"summary\": null"));
    }

    #[test]
    fn test_reserved_id_rejected() {
        let (dir, config) = project(&[("content/posts/__index.json", "{}")]);
        let err = Builder::new(config, dir.path())
            .build()
            .expect_err("reserved id");
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_prune_removes_deleted_entries() {
        let (dir, config) = project(&[
            ("content/posts/a.json", "{}"),
            ("content/posts/b.json", "{}"),
        ]);
        let builder = Builder::new(config, dir.path());
        builder.build().expect("first build");

        fs::remove_file(dir.path().join("content/posts/b.json")).expect("remove");
        let stats = builder.build().expect("second build");

        assert_eq!(stats.collections["posts"].pruned, 1);
        assert!(!builder.output_dir().join("collections/posts/b.mjs").exists());
        let index = fs::read_to_string(builder.output_dir().join("collections/posts/__index.mjs"))
            .expect("index");
        assert!(!index.contains("\"b\""));
    }

    #[test]
    fn test_clean_and_output_override() {
        let (dir, config) = project(&[("content/home.json", "{}")]);
        let out = dir.path().join("custom-out");
        let builder = Builder::new(config, dir.path()).with_output_dir(&out);

        builder.build().expect("build");
        assert!(out.join("singletons/home/home.mjs").exists());
        assert!(out.join("singletons/home/__index.mjs").exists());

        builder.clean().expect("clean");
        assert!(!out.exists());
    }
}
