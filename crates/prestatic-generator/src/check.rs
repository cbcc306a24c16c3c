//! Dry-run validation of schemas and entries.
//!
//! Reads and walks every entry like a build would, without compiling content or
//! touching the output directory.

use std::fmt;

use prestatic_core::{FieldSchema, Schema, config::ScopeKind, frontmatter::type_name};
use serde_json::Value;
use tracing::debug;

use crate::{
    build::Builder,
    emit::validate_id,
    store::ReadOptions,
    walker::{FormLeaf, WalkError, walk},
};

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Suspicious but buildable.
    Warning,
    /// The build would fail.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// One finding of [`Builder::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub kind: ScopeKind,
    pub scope: String,
    /// Entry id, or `None` for schema findings.
    pub id: Option<String>,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} `{}`", self.severity, self.kind, self.scope)?;
        if let Some(id) = &self.id {
            write!(f, ", entry `{id}`")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Outcome of a check run.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    /// Entries read and walked.
    pub entries: usize,

    /// Findings in scope order.
    pub issues: Vec<Issue>,
}

impl CheckReport {
    /// Number of findings with the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// Whether the report passes. In strict mode warnings fail too.
    pub fn passed(&self, strict: bool) -> bool {
        self.count(Severity::Error) == 0 && (!strict || self.count(Severity::Warning) == 0)
    }
}

impl Builder {
    /// Validate every schema and entry without compiling or writing anything.
    pub fn check(&self) -> CheckReport {
        let mut issues = Vec::new();
        let mut entries = 0;

        for (kind, name, scope) in self.config().scopes() {
            let mut push = |severity, id: Option<&str>, message: String| {
                issues.push(Issue {
                    severity,
                    kind,
                    scope: name.to_string(),
                    id: id.map(str::to_string),
                    message,
                });
            };

            for (severity, message) in schema_findings(&scope.schema) {
                push(severity, None, message);
            }

            let ids = match kind {
                ScopeKind::Collection => match self.store().list(name) {
                    Ok(ids) => ids,
                    Err(e) => {
                        push(Severity::Error, None, e.to_string());
                        continue;
                    }
                },
                ScopeKind::Singleton => vec![name.to_string()],
            };

            for id in &ids {
                if let Err(e) = validate_id(id) {
                    push(Severity::Error, Some(id.as_str()), e.to_string());
                    continue;
                }

                let options = ReadOptions {
                    resolve_linked_files: true,
                };
                let read = match kind {
                    ScopeKind::Collection => self.store().read(name, id, options),
                    ScopeKind::Singleton => self.store().read_singleton(name, options),
                };
                let mut entry = match read {
                    Ok(entry) => entry,
                    Err(e) => {
                        push(Severity::Error, Some(id.as_str()), e.to_string());
                        continue;
                    }
                };

                debug!(%kind, scope = name, id, "checking entry");
                entries += 1;
                if let Err(e) = walk(&scope.schema, &mut entry, &check_leaf) {
                    push(Severity::Error, Some(id.as_str()), e.to_string());
                }
            }
        }

        CheckReport { entries, issues }
    }
}

/// Content leaves must hold a string or null.
fn check_leaf(leaf: FormLeaf<'_>) -> Result<(), WalkError> {
    match &*leaf.value {
        Value::String(_) | Value::Null => Ok(()),
        _ if !leaf.field.form_kind.is_content() => Ok(()),
        other => Err(WalkError::SchemaContract {
            path: leaf.path.clone(),
            message: format!("content field must be a string, found {}", type_name(other)),
        }),
    }
}

/// Findings about the schema itself: `child` fields and empty conditionals.
fn schema_findings(schema: &Schema) -> Vec<(Severity, String)> {
    let mut findings = Vec::new();
    for (name, node) in schema {
        visit_schema(node, name, &mut findings);
    }
    findings
}

fn visit_schema(node: &FieldSchema, path: &str, findings: &mut Vec<(Severity, String)>) {
    match node {
        FieldSchema::Array { element } => visit_schema(element, &format!("{path}[]"), findings),
        FieldSchema::Object { fields } => {
            for (name, child) in fields {
                visit_schema(child, &format!("{path}.{name}"), findings);
            }
        }
        FieldSchema::Conditional { values } => {
            if values.is_empty() {
                findings.push((
                    Severity::Warning,
                    format!("conditional field `{path}` declares no variants"),
                ));
            }
            for child in values.values() {
                visit_schema(child, path, findings);
            }
        }
        FieldSchema::Form(_) => {}
        FieldSchema::Child => findings.push((
            Severity::Error,
            format!("field `{path}` uses the unsupported `child` kind"),
        )),
    }
}
