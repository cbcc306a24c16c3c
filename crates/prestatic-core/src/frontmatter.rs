//! Frontmatter splitting for markdown entry files.
//!
//! Markdown entries keep their structured fields in a YAML (`---`) or TOML
//! (`+++`) block at the top of the file and their long-form content in the body.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// Delimiter types for frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterFormat {
    /// YAML frontmatter delimited by `---`.
    Yaml,
    /// TOML frontmatter delimited by `+++`.
    Toml,
}

impl FrontmatterFormat {
    /// Get the delimiter string for this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

/// Split content into frontmatter and body.
///
/// The opening delimiter must start the file (leading whitespace aside) and the
/// closing delimiter must sit on a line of its own.
pub fn split_frontmatter(content: &str) -> Option<(FrontmatterFormat, &str, &str)> {
    let content = content.trim_start();

    let format = if content.starts_with("---") {
        FrontmatterFormat::Yaml
    } else if content.starts_with("+++") {
        FrontmatterFormat::Toml
    } else {
        return None;
    };

    let delimiter = format.delimiter();
    let rest = &content[delimiter.len()..];
    let after_open = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == delimiter {
            let frontmatter = after_open[..offset].trim();
            let body = after_open[offset + line.len()..].trim_start();
            return Some((format, frontmatter, body));
        }
        offset += line.len();
    }

    None
}

/// Parse frontmatter into an entry mapping and return it with the body.
///
/// Content without frontmatter yields an empty mapping and the full text as body.
pub fn parse_frontmatter(content: &str, path: &Path) -> Result<(Map<String, Value>, String)> {
    let Some((format, fm_str, body)) = split_frontmatter(content) else {
        return Ok((Map::new(), content.to_string()));
    };

    if fm_str.is_empty() {
        return Ok((Map::new(), body.to_string()));
    }

    let value: Value = match format {
        FrontmatterFormat::Yaml => {
            serde_yaml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?
        }
        FrontmatterFormat::Toml => {
            toml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?
        }
    };

    match value {
        Value::Object(map) => Ok((map, body.to_string())),
        Value::Null => Ok((Map::new(), body.to_string())),
        other => Err(CoreError::frontmatter(
            path,
            format!("frontmatter must be a mapping, found {}", type_name(&other)),
        )),
    }
}

/// Short name of a JSON value's type, for messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
