//! Entry fingerprints and the versioned reader for previously generated modules.
//!
//! A fingerprint is the SHA-256 of the module format version, the compiler
//! identity, the scope schema and the raw entry, each as canonical JSON with
//! sorted keys. Generated modules record it in their first line so the next
//! build can decide whether an entry changed without executing the module.

use std::{fmt, fmt::Write as _, fs, path::Path};

use prestatic_core::Schema;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Version of the generated module layout. Bumping it invalidates every module.
pub const FORMAT_VERSION: u32 = 1;

/// Marker that starts the first line of every generated file.
pub const GENERATED_MARKER: &str = "// @generated by prestatic";

/// Errors reading a fingerprint back from a generated module.
///
/// These are never fatal: the entry is treated as changed and rebuilt.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The module could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The first line is not a per-entry module header.
    #[error("missing generated module header")]
    MissingHeader,

    /// The module was written by a different format version.
    #[error("module format version {found} does not match {expected}")]
    VersionMismatch { found: String, expected: u32 },

    /// The header or the `fingerprint` binding is malformed or disagrees.
    #[error("corrupt module: {0}")]
    Corrupt(String),
}

/// Hex-encoded SHA-256 digest identifying one build of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parse a hex digest.
    pub fn parse(hex_digest: &str) -> Option<Self> {
        let valid = hex_digest.len() == 64
            && hex_digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex_digest.to_string()))
    }

    /// The digest as lowercase hex.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes fingerprints for the entries of one scope.
///
/// The format version, compiler identity and schema are hashed once up front.
#[derive(Clone)]
pub struct Fingerprinter {
    prefix: Sha256,
}

impl fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprinter").finish_non_exhaustive()
    }
}

impl Fingerprinter {
    /// Create a fingerprinter for entries built by `identity` against `schema`.
    pub fn new(identity: &str, schema: &Schema) -> serde_json::Result<Self> {
        let schema = serde_json::to_value(schema)?;

        let mut prefix = Sha256::new();
        prefix.update(FORMAT_VERSION.to_string().as_bytes());
        prefix.update([0u8]);
        prefix.update(identity.as_bytes());
        prefix.update([0u8]);
        prefix.update(canonical_json(&schema).as_bytes());
        prefix.update([0u8]);

        Ok(Self { prefix })
    }

    /// Fingerprint of a raw, not yet compiled entry.
    pub fn fingerprint(&self, entry: &Value) -> Fingerprint {
        let mut hasher = self.prefix.clone();
        hasher.update(canonical_json(entry).as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }
}

/// Serialize a value as compact JSON with object keys in sorted order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        // Scalars have a single compact rendering.
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

/// First line of a per-entry module.
pub fn entry_header(fingerprint: &Fingerprint) -> String {
    format!("{GENERATED_MARKER} (format {FORMAT_VERSION}) fingerprint={fingerprint}")
}

/// Read the fingerprint recorded in a previously generated per-entry module.
///
/// The header must carry the current format version and agree with the
/// module's `fingerprint` binding. Generated code is never executed.
pub fn read_fingerprint(path: &Path) -> Result<Fingerprint, CacheError> {
    let content = fs::read_to_string(path)?;
    parse_fingerprint(&content)
}

fn parse_fingerprint(content: &str) -> Result<Fingerprint, CacheError> {
    let mut lines = content.lines();
    let header = lines.next().unwrap_or_default();

    let rest = header
        .strip_prefix(GENERATED_MARKER)
        .and_then(|rest| rest.strip_prefix(" (format "))
        .ok_or(CacheError::MissingHeader)?;

    let (version, rest) = rest
        .split_once(')')
        .ok_or_else(|| CacheError::Corrupt("unterminated format version".to_string()))?;

    if version.parse::<u32>().ok() != Some(FORMAT_VERSION) {
        return Err(CacheError::VersionMismatch {
            found: version.to_string(),
            expected: FORMAT_VERSION,
        });
    }

    let recorded = rest
        .trim()
        .strip_prefix("fingerprint=")
        .and_then(Fingerprint::parse)
        .ok_or_else(|| CacheError::Corrupt("malformed header fingerprint".to_string()))?;

    let binding = lines
        .find_map(|line| line.strip_prefix("export const fingerprint = \""))
        .and_then(|rest| rest.strip_suffix("\";"))
        .ok_or_else(|| CacheError::Corrupt("missing `fingerprint` export".to_string()))?;

    if binding != recorded.as_str() {
        return Err(CacheError::Corrupt(
            "`fingerprint` export disagrees with header".to_string(),
        ));
    }

    Ok(recorded)
}
