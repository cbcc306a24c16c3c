//! Writing generated modules to the output directory.

use std::{
    collections::HashSet,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use prestatic_core::config::ScopeKind;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{
    fingerprint::{Fingerprint, GENERATED_MARKER},
    module::{self, INDEX_MODULE, MODULE_EXTENSION},
};

/// Emitter errors.
#[derive(Debug, Error)]
pub enum EmitError {
    /// Filesystem error.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The entry value could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The entry id collides with the aggregate module name.
    #[error("entry id `{0}` is reserved")]
    ReservedId(String),

    /// The entry id cannot be used as a file name.
    #[error("entry id `{0}` is not a valid file name")]
    InvalidId(String),
}

impl EmitError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for emitter operations.
pub type Result<T> = std::result::Result<T, EmitError>;

/// Writes modules under one output root and counts filesystem mutations.
#[derive(Debug)]
pub struct Emitter {
    root: PathBuf,
    writes: AtomicUsize,
}

impl Emitter {
    /// Create an emitter for `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writes: AtomicUsize::new(0),
        }
    }

    /// The output root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Modules written or removed so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Directory holding the modules of one collection or singleton.
    pub fn scope_dir(&self, kind: ScopeKind, name: &str) -> PathBuf {
        self.root.join(kind.dir_name()).join(name)
    }

    /// Create the scope directory if needed and return it.
    pub fn ensure_scope_dir(&self, kind: ScopeKind, name: &str) -> Result<PathBuf> {
        let dir = self.scope_dir(kind, name);
        fs::create_dir_all(&dir).map_err(|e| EmitError::io(&dir, e))?;
        Ok(dir)
    }

    /// Path of the per-entry module of `id` inside `dir`.
    pub fn entry_path(dir: &Path, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(dir.join(format!("{id}.{MODULE_EXTENSION}")))
    }

    /// Write a per-entry module in one atomic step.
    pub fn write_entry(&self, path: &Path, fingerprint: &Fingerprint, entry: &Value) -> Result<()> {
        let source = module::render_entry(fingerprint, entry)?;
        write_atomic(path, source.as_bytes())?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(path = %path.display(), "wrote entry module");
        Ok(())
    }

    /// Write the aggregate module of `dir`.
    ///
    /// Unless `force` is set, the write is skipped when the file already holds
    /// `source`. Returns whether the file was written.
    pub fn write_index(&self, dir: &Path, source: &str, force: bool) -> Result<bool> {
        let path = dir.join(format!("{INDEX_MODULE}.{MODULE_EXTENSION}"));

        match fs::read(&path) {
            Ok(existing) if !force && existing == source.as_bytes() => {
                debug!(path = %path.display(), "aggregate module unchanged");
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(EmitError::io(&path, e)),
        }

        write_atomic(&path, source.as_bytes())?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(path = %path.display(), "wrote aggregate module");
        Ok(true)
    }

    /// Remove generated entry modules in `dir` whose id is not in `keep`.
    ///
    /// Files without the generated header are left alone. Temp files left by an
    /// interrupted [`write_atomic`] are deleted too, but are not counted as
    /// writes. Returns the removed module paths.
    pub fn prune(&self, dir: &Path, keep: &HashSet<&str>) -> Result<Vec<PathBuf>> {
        let read_dir = match fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EmitError::io(dir, e)),
        };

        let mut removed = Vec::new();
        for dir_entry in read_dir {
            let path = dir_entry.map_err(|e| EmitError::io(dir, e))?.path();

            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_temp_file)
            {
                fs::remove_file(&path).map_err(|e| EmitError::io(&path, e))?;
                debug!(path = %path.display(), "removed leftover temp file");
                continue;
            }

            if path.extension().and_then(|e| e.to_str()) != Some(MODULE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem == INDEX_MODULE || keep.contains(stem) || !is_generated(&path) {
                continue;
            }

            fs::remove_file(&path).map_err(|e| EmitError::io(&path, e))?;
            self.writes.fetch_add(1, Ordering::Relaxed);
            debug!(path = %path.display(), "pruned stale module");
            removed.push(path);
        }

        removed.sort();
        Ok(removed)
    }

    /// Remove the whole output root.
    pub fn clean(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                debug!(dir = %self.root.display(), "removed output directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EmitError::io(&self.root, e)),
        }
    }
}

/// Reject ids that would escape the scope directory or clash with the aggregate.
pub fn validate_id(id: &str) -> Result<()> {
    if id == INDEX_MODULE {
        return Err(EmitError::ReservedId(id.to_string()));
    }
    if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\', '\0']) {
        return Err(EmitError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Whether the file at `path` starts with the generated marker.
fn is_generated(path: &Path) -> bool {
    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line).is_ok()
        && first_line.starts_with(GENERATED_MARKER)
}

const TEMP_SUFFIX: &str = ".tmp";

/// Whether `file_name` has the `.<module>.<pid>.tmp` shape used by [`write_atomic`].
fn is_temp_file(file_name: &str) -> bool {
    let Some(inner) = file_name
        .strip_prefix('.')
        .and_then(|n| n.strip_suffix(TEMP_SUFFIX))
    else {
        return false;
    };
    let Some((module, pid)) = inner.rsplit_once('.') else {
        return false;
    };
    !pid.is_empty()
        && pid.bytes().all(|b| b.is_ascii_digit())
        && module
            .strip_suffix(MODULE_EXTENSION)
            .is_some_and(|stem| stem.ends_with('.') && stem.len() > 1)
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EmitError::InvalidId(path.display().to_string()))?;
    let tmp = path.with_file_name(format!(".{file_name}.{}{TEMP_SUFFIX}", std::process::id()));

    fs::write(&tmp, bytes).map_err(|e| EmitError::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(EmitError::io(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fingerprint() -> Fingerprint {
        Fingerprint::parse(&"ab".repeat(32)).expect("digest")
    }

    #[test]
    fn test_scope_dirs() {
        let emitter = Emitter::new("/out");
        assert_eq!(
            emitter.scope_dir(ScopeKind::Collection, "posts"),
            PathBuf::from("/out/collections/posts")
        );
        assert_eq!(
            emitter.scope_dir(ScopeKind::Singleton, "home"),
            PathBuf::from("/out/singletons/home")
        );
    }

    #[test]
    fn test_write_entry_is_readable_by_cache() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let emitter = Emitter::new(dir.path());
        let scope = emitter
            .ensure_scope_dir(ScopeKind::Collection, "posts")
            .expect("scope dir");
        let path = Emitter::entry_path(&scope, "hello").expect("path");

        emitter
            .write_entry(&path, &fingerprint(), &json!({ "title": "Hello" }))
            .expect("write");

        assert_eq!(emitter.writes(), 1);
        assert_eq!(
            crate::fingerprint::read_fingerprint(&path).expect("read back"),
            fingerprint()
        );
        let leftovers: Vec<_> = fs::read_dir(&scope)
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_index_only_when_changed() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let emitter = Emitter::new(dir.path());

        assert!(emitter.write_index(dir.path(), "a", false).expect("first write"));
        assert!(!emitter.write_index(dir.path(), "a", false).expect("same bytes"));
        assert!(emitter.write_index(dir.path(), "a", true).expect("forced"));
        assert!(emitter.write_index(dir.path(), "b", false).expect("new bytes"));
        assert_eq!(emitter.writes(), 3);
    }

    #[test]
    fn test_prune_only_removes_generated_files() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let emitter = Emitter::new(dir.path());

        for id in ["keep", "stale"] {
            let path = Emitter::entry_path(dir.path(), id).expect("path");
            emitter
                .write_entry(&path, &fingerprint(), &json!({}))
                .expect("write");
        }
        fs::write(dir.path().join("handwritten.mjs"), "export const x = 1;\n").expect("write");
        emitter
            .write_index(dir.path(), &module::render_collection_index(&[]), false)
            .expect("index");

        let keep: HashSet<&str> = ["keep"].into_iter().collect();
        let removed = emitter.prune(dir.path(), &keep).expect("prune");

        assert_eq!(removed, vec![dir.path().join("stale.mjs")]);
        assert!(dir.path().join("keep.mjs").exists());
        assert!(dir.path().join("handwritten.mjs").exists());
        assert!(dir.path().join("__index.mjs").exists());
    }

    #[test]
    fn test_prune_sweeps_interrupted_writes() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let emitter = Emitter::new(dir.path());

        let path = Emitter::entry_path(dir.path(), "keep").expect("path");
        emitter
            .write_entry(&path, &fingerprint(), &json!({}))
            .expect("write");
        for leftover in [".keep.mjs.4242.tmp", ".__index.mjs.17.tmp"] {
            fs::write(dir.path().join(leftover), "partial").expect("write leftover");
        }
        for unrelated in [".editor.tmp", "notes.tmp", ".keep.mjs.swp"] {
            fs::write(dir.path().join(unrelated), "mine").expect("write unrelated");
        }

        let keep: HashSet<&str> = ["keep"].into_iter().collect();
        let removed = emitter.prune(dir.path(), &keep).expect("prune");

        assert!(removed.is_empty());
        assert_eq!(emitter.writes(), 1);
        assert!(!dir.path().join(".keep.mjs.4242.tmp").exists());
        assert!(!dir.path().join(".__index.mjs.17.tmp").exists());
        assert!(dir.path().join("keep.mjs").exists());
        for unrelated in [".editor.tmp", "notes.tmp", ".keep.mjs.swp"] {
            assert!(dir.path().join(unrelated).exists(), "{unrelated} was removed");
        }
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(".post.mjs.123.tmp"));
        assert!(is_temp_file(".a.b.mjs.1.tmp"));
        assert!(!is_temp_file("post.mjs.123.tmp"));
        assert!(!is_temp_file(".post.mjs.tmp"));
        assert!(!is_temp_file(".post.mjs.12a.tmp"));
        assert!(!is_temp_file(".mjs.1.tmp"));
        assert!(!is_temp_file(".post.js.1.tmp"));
    }

    #[test]
    fn test_prune_missing_dir() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let emitter = Emitter::new(dir.path());
        let removed = emitter
            .prune(&dir.path().join("nope"), &HashSet::new())
            .expect("prune");
        assert!(removed.is_empty());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("post-a").is_ok());
        assert!(matches!(validate_id("__index"), Err(EmitError::ReservedId(_))));
        assert!(matches!(validate_id("../x"), Err(EmitError::InvalidId(_))));
        assert!(matches!(validate_id(""), Err(EmitError::InvalidId(_))));
    }

    #[test]
    fn test_clean_removes_root() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().join("out");
        let emitter = Emitter::new(&root);
        emitter
            .ensure_scope_dir(ScopeKind::Singleton, "home")
            .expect("scope dir");

        emitter.clean().expect("clean");
        assert!(!root.exists());
        emitter.clean().expect("clean twice");
    }
}
