//! Entry storage.
//!
//! The builder reads entries through the [`EntryStore`] trait. [`FsEntryStore`]
//! reads them from data and markdown files under the project root.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use prestatic_core::{
    Config,
    config::{ScopeConfig, ScopeKind},
    frontmatter::{parse_frontmatter, type_name},
    schema::top_level_content_fields,
};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

/// Data file extensions, in lookup order.
const DATA_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml"];

/// Markdown file extensions, in lookup order.
const MARKDOWN_EXTENSIONS: &[&str] = &["md", "mdx", "mdoc"];

/// Entry store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No entry with this id exists.
    #[error("{kind} `{name}` has no entry `{id}`")]
    NotFound {
        kind: ScopeKind,
        name: String,
        id: String,
    },

    /// The entry file is not valid JSON, YAML, TOML or frontmatter.
    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The entry file parsed but does not hold an entry.
    #[error("invalid entry in {path}: {message}")]
    Format { path: PathBuf, message: String },

    /// The scope is not configured.
    #[error("unknown {kind} `{name}`")]
    UnknownScope { kind: ScopeKind, name: String },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn parse(path: &Path, message: impl ToString) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    fn format(path: &Path, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Options for reading one entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Fill absent top-level content fields from files next to the entry.
    pub resolve_linked_files: bool,
}

/// Source of entries for collections and singletons.
pub trait EntryStore: Send + Sync {
    /// Ids of every entry in a collection, sorted.
    fn list(&self, collection: &str) -> Result<Vec<String>>;

    /// Read one collection entry.
    fn read(&self, collection: &str, id: &str, options: ReadOptions) -> Result<Value>;

    /// Read the entry of a singleton.
    fn read_singleton(&self, singleton: &str, options: ReadOptions) -> Result<Value>;
}

impl std::fmt::Debug for dyn EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EntryStore")
    }
}

/// Entry store backed by files under a project root.
///
/// A collection entry is `<dir>/<id>.<ext>` or `<dir>/<id>/index.<ext>`; a
/// singleton is the same with its path standing in for `<dir>/<id>`.
#[derive(Debug, Clone)]
pub struct FsEntryStore {
    root: PathBuf,
    config: Config,
}

/// A located entry file.
struct EntryFile {
    path: PathBuf,
    /// Directory holding files linked to the entry.
    linked_dir: PathBuf,
}

impl FsEntryStore {
    /// Create a store reading the scopes of `config` relative to `root`.
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    fn scope(&self, kind: ScopeKind, name: &str) -> Result<&ScopeConfig> {
        self.config
            .scope(kind, name)
            .ok_or_else(|| StoreError::UnknownScope {
                kind,
                name: name.to_string(),
            })
    }

    /// Find `<stem>.<ext>` or `<stem>/index.<ext>` in `dir`.
    fn locate(dir: &Path, stem: &str) -> Option<EntryFile> {
        let linked_dir = dir.join(stem);
        let extensions = DATA_EXTENSIONS.iter().chain(MARKDOWN_EXTENSIONS);

        let path = extensions
            .clone()
            .map(|ext| dir.join(format!("{stem}.{ext}")))
            .chain(extensions.map(|ext| linked_dir.join(format!("index.{ext}"))))
            .find(|path| path.is_file())?;

        Some(EntryFile { path, linked_dir })
    }

    fn read_entry(
        &self,
        scope: &ScopeConfig,
        file: &EntryFile,
        options: ReadOptions,
    ) -> Result<Value> {
        trace!(path = %file.path.display(), "reading entry");
        let path = &file.path;
        let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();

        let mut fields = if MARKDOWN_EXTENSIONS.contains(&ext) {
            let (mut fields, body) =
                parse_frontmatter(&content, path).map_err(|e| StoreError::parse(path, e))?;

            match &scope.content_field {
                Some(field) => {
                    fields.insert(field.clone(), Value::String(body));
                }
                None if body.trim().is_empty() => {}
                None => {
                    return Err(StoreError::format(
                        path,
                        "markdown body found but no content_field is configured",
                    ));
                }
            }
            fields
        } else {
            let value: Value = match ext {
                "json" => serde_json::from_str(&content).map_err(|e| StoreError::parse(path, e))?,
                "toml" => toml::from_str(&content).map_err(|e| StoreError::parse(path, e))?,
                _ => serde_yaml::from_str(&content).map_err(|e| StoreError::parse(path, e))?,
            };
            match value {
                Value::Object(fields) => fields,
                Value::Null => Map::new(),
                other => {
                    return Err(StoreError::format(
                        path,
                        format!("entry must be a mapping, found {}", type_name(&other)),
                    ));
                }
            }
        };

        if options.resolve_linked_files {
            resolve_linked_files(scope, &file.linked_dir, &mut fields)?;
        }

        Ok(Value::Object(fields))
    }
}

/// Read absent top-level content fields from `<dir>/<field>.{md,mdx,mdoc}`.
fn resolve_linked_files(
    scope: &ScopeConfig,
    dir: &Path,
    fields: &mut Map<String, Value>,
) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for field in top_level_content_fields(&scope.schema) {
        if fields.contains_key(field) {
            continue;
        }

        let linked = MARKDOWN_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{field}.{ext}")))
            .find(|path| path.is_file());

        if let Some(path) = linked {
            let content = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            debug!(field, path = %path.display(), "resolved linked content file");
            fields.insert(field.to_string(), Value::String(content));
        }
    }

    Ok(())
}

fn is_supported(ext: &str) -> bool {
    DATA_EXTENSIONS.contains(&ext) || MARKDOWN_EXTENSIONS.contains(&ext)
}

impl EntryStore for FsEntryStore {
    fn list(&self, collection: &str) -> Result<Vec<String>> {
        let scope = self.scope(ScopeKind::Collection, collection)?;
        let dir = self.root.join(scope.base_path());

        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(collection, dir = %dir.display(), "collection directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut ids = BTreeSet::new();
        for dir_entry in read_dir {
            let path = dir_entry.map_err(|e| StoreError::io(&dir, e))?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            if path.is_dir() {
                let has_index = DATA_EXTENSIONS
                    .iter()
                    .chain(MARKDOWN_EXTENSIONS)
                    .any(|ext| path.join(format!("index.{ext}")).is_file());
                if has_index {
                    ids.insert(name.to_string());
                }
            } else if let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|e| e.to_str()),
            ) {
                if is_supported(ext) {
                    ids.insert(stem.to_string());
                }
            }
        }

        Ok(ids.into_iter().collect())
    }

    fn read(&self, collection: &str, id: &str, options: ReadOptions) -> Result<Value> {
        let scope = self.scope(ScopeKind::Collection, collection)?;
        let dir = self.root.join(scope.base_path());

        let file = Self::locate(&dir, id).ok_or_else(|| StoreError::NotFound {
            kind: ScopeKind::Collection,
            name: collection.to_string(),
            id: id.to_string(),
        })?;

        self.read_entry(scope, &file, options)
    }

    fn read_singleton(&self, singleton: &str, options: ReadOptions) -> Result<Value> {
        let scope = self.scope(ScopeKind::Singleton, singleton)?;
        let base = self.root.join(scope.base_path());
        let not_found = || StoreError::NotFound {
            kind: ScopeKind::Singleton,
            name: singleton.to_string(),
            id: singleton.to_string(),
        };

        let (Some(dir), Some(stem)) = (base.parent(), base.file_name().and_then(|n| n.to_str()))
        else {
            return Err(not_found());
        };

        let file = Self::locate(dir, stem).ok_or_else(not_found)?;
        self.read_entry(scope, &file, options)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    const CONFIG: &str = r#"
[collections.posts]
path = "content/posts/*"
content_field = "content"

[collections.posts.schema]
title = { kind = "form", form_kind = "text" }
content = { kind = "form", form_kind = "content" }

[collections.authors]
path = "content/authors/*"

[collections.authors.schema]
name = { kind = "form", form_kind = "text" }

[singletons.home]
path = "content/home"

[singletons.home.schema]
headline = { kind = "form", form_kind = "text" }
body = { kind = "form", form_kind = "content" }
"#;

    fn setup(files: &[(&str, &str)]) -> (TempDir, FsEntryStore) {
        let dir = tempfile::tempdir().expect("create temp dir");
        for (path, content) in files {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(path, content).expect("write");
        }
        let config: Config = CONFIG.parse().expect("config");
        let store = FsEntryStore::new(dir.path(), config);
        (dir, store)
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let (_dir, store) = setup(&[
            ("content/posts/b.md", "# B"),
            ("content/posts/a.json", "{}"),
            ("content/posts/c/index.yaml", "title: C"),
            ("content/posts/.hidden.json", "{}"),
            ("content/posts/notes.txt", "ignored"),
            ("content/posts/empty/readme.txt", "no index"),
        ]);

        assert_eq!(store.list("posts").expect("list"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_list_missing_directory() {
        let (_dir, store) = setup(&[]);
        assert!(store.list("authors").expect("list").is_empty());
    }

    #[test]
    fn test_list_unknown_collection() {
        let (_dir, store) = setup(&[]);
        let err = store.list("nope").expect_err("unknown");
        assert!(matches!(err, StoreError::UnknownScope { .. }));
    }

    #[test]
    fn test_read_markdown_entry() {
        let (_dir, store) = setup(&[(
            "content/posts/hello.md",
            "---\ntitle: Hello\n---\n\n# Hi\n",
        )]);

        let entry = store
            .read("posts", "hello", ReadOptions::default())
            .expect("read");
        assert_eq!(entry, json!({ "title": "Hello", "content": "# Hi\n" }));
    }

    #[test]
    fn test_read_data_formats() {
        let (_dir, store) = setup(&[
            ("content/authors/a.json", r#"{ "name": "Ada" }"#),
            ("content/authors/b.toml", "name = \"Bob\"\n"),
            ("content/authors/c/index.yml", "name: Cy\n"),
        ]);

        for (id, name) in [("a", "Ada"), ("b", "Bob"), ("c", "Cy")] {
            let entry = store
                .read("authors", id, ReadOptions::default())
                .expect("read");
            assert_eq!(entry, json!({ "name": name }));
        }
    }

    #[test]
    fn test_body_without_content_field_is_format_error() {
        let (_dir, store) = setup(&[("content/authors/a.md", "---\nname: A\n---\nBio")]);
        let err = store
            .read("authors", "a", ReadOptions::default())
            .expect_err("body without content field");
        assert!(matches!(err, StoreError::Format { .. }));
    }

    #[test]
    fn test_non_mapping_entry_is_format_error() {
        let (_dir, store) = setup(&[("content/authors/a.json", "[1, 2]")]);
        let err = store
            .read("authors", "a", ReadOptions::default())
            .expect_err("array root");
        assert!(err.to_string().contains("must be a mapping"));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let (_dir, store) = setup(&[("content/authors/a.json", "{ nope")]);
        let err = store
            .read("authors", "a", ReadOptions::default())
            .expect_err("bad json");
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn test_read_missing_entry() {
        let (_dir, store) = setup(&[]);
        let err = store
            .read("posts", "ghost", ReadOptions::default())
            .expect_err("missing");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_singleton_with_linked_content() {
        let (_dir, store) = setup(&[
            ("content/home/index.yaml", "headline: Welcome\n"),
            ("content/home/body.mdoc", "Hello **there**"),
        ]);

        let plain = store
            .read_singleton("home", ReadOptions::default())
            .expect("read");
        assert_eq!(plain, json!({ "headline": "Welcome" }));

        let resolved = store
            .read_singleton(
                "home",
                ReadOptions {
                    resolve_linked_files: true,
                },
            )
            .expect("read");
        assert_eq!(
            resolved,
            json!({ "headline": "Welcome", "body": "Hello **there**" })
        );
    }

    #[test]
    fn test_linked_content_does_not_override_inline_value() {
        let (_dir, store) = setup(&[
            ("content/home.json", r#"{ "headline": "Hi", "body": "inline" }"#),
            ("content/home/body.md", "linked"),
        ]);

        let entry = store
            .read_singleton(
                "home",
                ReadOptions {
                    resolve_linked_files: true,
                },
            )
            .expect("read");
        assert_eq!(entry["body"], "inline");
    }

    #[test]
    fn test_missing_singleton() {
        let (_dir, store) = setup(&[]);
        let err = store
            .read_singleton("home", ReadOptions::default())
            .expect_err("missing");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
