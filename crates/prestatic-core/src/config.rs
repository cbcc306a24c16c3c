//! Project configuration management.

use std::{fmt, path::Path, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::{CoreError, Result},
    schema::{FieldSchema, Schema},
};

/// Main configuration structure for prestatic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Content compiler settings.
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Collections, in processing order.
    #[serde(default)]
    pub collections: IndexMap<String, ScopeConfig>,

    /// Singletons, in processing order.
    #[serde(default)]
    pub singletons: IndexMap<String, ScopeConfig>,
}

/// Build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Output root for generated modules, relative to the project root.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Whether to delete generated modules whose entry no longer exists.
    #[serde(default = "default_true")]
    pub prune: bool,
}

/// Content compiler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Representation produced for content fields.
    #[serde(default)]
    pub format: OutputFormat,

    /// Base URL that relative link and image targets are resolved against.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Whether fenced code blocks are syntax highlighted.
    #[serde(default = "default_true")]
    pub highlight: bool,

    /// Syntax highlighting theme name.
    #[serde(default = "default_syntax_theme")]
    pub syntax_theme: String,

    /// Whether raw HTML inside content is accepted.
    #[serde(default = "default_true")]
    pub allow_html: bool,
}

/// Output-format selector for compiled content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Rendered HTML.
    #[default]
    Html,
    /// Plain text with markup removed.
    Text,
}

impl OutputFormat {
    /// The selector as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a scope holds many entries or exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Many entries addressed by id.
    Collection,
    /// Exactly one entry.
    Singleton,
}

impl ScopeKind {
    /// Directory name used under the output root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Collection => "collections",
            Self::Singleton => "singletons",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection => f.write_str("collection"),
            Self::Singleton => f.write_str("singleton"),
        }
    }
}

/// A collection or singleton definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Storage path relative to the project root.
    ///
    /// Collections end in a `*` segment (`content/posts/*`); singletons name the
    /// entry itself (`content/index-page`).
    pub path: String,

    /// Human-readable label.
    #[serde(default)]
    pub label: Option<String>,

    /// Top-level content field that holds the body of markdown entry files.
    #[serde(default)]
    pub content_field: Option<String>,

    /// Root field schema.
    #[serde(default)]
    pub schema: Schema,
}

impl ScopeConfig {
    /// Storage location with any trailing wildcard segment removed.
    pub fn base_path(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        let trimmed = trimmed.strip_suffix('*').unwrap_or(trimmed);
        trimmed.trim_end_matches('/')
    }

    fn validate(&self, kind: ScopeKind, name: &str) -> Result<()> {
        let invalid = |message: String| Err(CoreError::scope(kind, name, message));

        if self.path.trim().is_empty() {
            return invalid("path cannot be empty".to_string());
        }

        if kind == ScopeKind::Collection && !self.path.trim_end_matches('/').ends_with('*') {
            return invalid(format!("path `{}` must end with a `*` segment", self.path));
        }

        if let Some(field) = &self.content_field {
            match self.schema.get(field) {
                Some(node) if node.is_content() => {}
                Some(FieldSchema::Form(form)) => {
                    return invalid(format!(
                        "content_field `{field}` is a `{}` form field, not a content form field",
                        form.form_kind
                    ));
                }
                Some(node) => {
                    return invalid(format!(
                        "content_field `{field}` is a `{}` field, not a content form field",
                        node.kind_name()
                    ));
                }
                None => {
                    return invalid(format!(
                        "content_field `{field}` is not declared in the schema"
                    ));
                }
            }
        }

        if self.schema.is_empty() {
            tracing::warn!(%kind, name, "schema declares no fields");
        }

        if self.schema.values().any(contains_child) {
            tracing::warn!(
                %kind,
                name,
                "schema contains a `child` field; entries using it will fail to build"
            );
        }

        Ok(())
    }
}

fn contains_child(node: &FieldSchema) -> bool {
    match node {
        FieldSchema::Child => true,
        FieldSchema::Array { element } => contains_child(element),
        FieldSchema::Object { fields } => fields.values().any(contains_child),
        FieldSchema::Conditional { values } => values.values().any(contains_child),
        FieldSchema::Form(_) => false,
    }
}

/// Environment overrides for the scalar sections.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    #[serde(default)]
    build: BuildOverrides,
    #[serde(default)]
    compiler: CompilerOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct BuildOverrides {
    output_dir: Option<String>,
    prune: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CompilerOverrides {
    format: Option<OutputFormat>,
    base_url: Option<String>,
    highlight: Option<bool>,
    syntax_theme: Option<String>,
    allow_html: Option<bool>,
}

impl EnvOverrides {
    fn apply(self, config: &mut Config) {
        let Self { build, compiler } = self;

        if let Some(output_dir) = build.output_dir {
            config.build.output_dir = output_dir;
        }
        if let Some(prune) = build.prune {
            config.build.prune = prune;
        }
        if let Some(format) = compiler.format {
            config.compiler.format = format;
        }
        if let Some(base_url) = compiler.base_url {
            config.compiler.base_url = Some(base_url);
        }
        if let Some(highlight) = compiler.highlight {
            config.compiler.highlight = highlight;
        }
        if let Some(syntax_theme) = compiler.syntax_theme {
            config.compiler.syntax_theme = syntax_theme;
        }
        if let Some(allow_html) = compiler.allow_html {
            config.compiler.allow_html = allow_html;
        }
    }
}

// Default value functions
fn default_output_dir() -> String {
    ".content".to_string()
}

fn default_syntax_theme() -> String {
    "base16-ocean.dark".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            prune: true,
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            base_url: None,
            highlight: true,
            syntax_theme: default_syntax_theme(),
            allow_html: true,
        }
    }
}

impl FromStr for Config {
    type Err = CoreError;

    fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| CoreError::config_with_source("Failed to parse configuration", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `PRESTATIC__SECTION__KEY` environment overrides.
    ///
    /// Only `[build]` and `[compiler]` keys can be overridden. Schemas always
    /// come from the file, with their field names untouched.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;

        let env = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("PRESTATIC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let overrides: EnvOverrides = env.try_deserialize()?;
        overrides.apply(&mut config);

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.build.output_dir.trim().is_empty() {
            return Err(CoreError::config("build.output_dir cannot be empty"));
        }

        for (kind, name, scope) in self.scopes() {
            scope.validate(kind, name)?;
        }

        if self.collections.is_empty() && self.singletons.is_empty() {
            tracing::warn!("no collections or singletons are configured");
        }

        Ok(())
    }

    /// All scopes: collections first, then singletons, each in declaration order.
    pub fn scopes(&self) -> impl Iterator<Item = (ScopeKind, &str, &ScopeConfig)> {
        let collections = self
            .collections
            .iter()
            .map(|(name, scope)| (ScopeKind::Collection, name.as_str(), scope));
        let singletons = self
            .singletons
            .iter()
            .map(|(name, scope)| (ScopeKind::Singleton, name.as_str(), scope));
        collections.chain(singletons)
    }

    /// Look up a scope by kind and name.
    pub fn scope(&self, kind: ScopeKind, name: &str) -> Option<&ScopeConfig> {
        match kind {
            ScopeKind::Collection => self.collections.get(name),
            ScopeKind::Singleton => self.singletons.get(name),
        }
    }
}
