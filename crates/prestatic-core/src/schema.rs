//! Field schema algebra.
//!
//! A schema describes the shape of an entry as a tree of typed nodes. Every
//! node kind is a variant of [`FieldSchema`], so traversals can match on it
//! exhaustively.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Root schema of a collection or singleton: field name to node.
///
/// The root is treated as an implicit [`FieldSchema::Object`].
pub type Schema = IndexMap<String, FieldSchema>;

/// One node of a field schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldSchema {
    /// A sequence whose elements all follow `element`.
    Array { element: Box<FieldSchema> },

    /// A mapping of named fields.
    Object { fields: IndexMap<String, FieldSchema> },

    /// A tagged union: `{ "discriminant": <key>, "value": <variant value> }`.
    Conditional { values: IndexMap<String, FieldSchema> },

    /// A leaf form field.
    Form(FormField),

    /// Reserved child document field. Traversal has no semantics for it.
    Child,
}

impl FieldSchema {
    /// Shorthand for an object node from the given fields.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldSchema)>,
        K: Into<String>,
    {
        Self::Object {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Shorthand for an array node.
    pub fn array(element: FieldSchema) -> Self {
        Self::Array {
            element: Box::new(element),
        }
    }

    /// Shorthand for a conditional node.
    pub fn conditional<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldSchema)>,
        K: Into<String>,
    {
        Self::Conditional {
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Shorthand for a form leaf of the given kind.
    pub fn form(kind: impl Into<FormKind>) -> Self {
        Self::Form(FormField {
            form_kind: kind.into(),
            label: None,
        })
    }

    /// Shorthand for a content form leaf.
    pub fn content() -> Self {
        Self::form(FormKind::Content)
    }

    /// The `kind` tag of this node.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
            Self::Conditional { .. } => "conditional",
            Self::Form(_) => "form",
            Self::Child => "child",
        }
    }

    /// Whether this node is a form leaf of kind `content`.
    pub fn is_content(&self) -> bool {
        matches!(self, Self::Form(field) if field.form_kind.is_content())
    }
}

/// Descriptor of a form leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Which kind of form input produced the value.
    pub form_kind: FormKind,

    /// Human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Kind tag of a form leaf. Only `content` requires compilation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FormKind {
    /// Long-form markup that is compiled.
    Content,
    /// Any other form kind; passed through untouched.
    Other(String),
}

impl FormKind {
    /// Whether this kind marks a field for compilation.
    pub fn is_content(&self) -> bool {
        matches!(self, Self::Content)
    }

    /// The tag as written in configuration.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Content => "content",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for FormKind {
    fn from(value: String) -> Self {
        if value == "content" {
            Self::Content
        } else {
            Self::Other(value)
        }
    }
}

impl From<&str> for FormKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<FormKind> for String {
    fn from(kind: FormKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for FormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of the top-level fields that are content leaves, in declaration order.
pub fn top_level_content_fields(schema: &Schema) -> Vec<&str> {
    schema
        .iter()
        .filter(|(_, node)| node.is_content())
        .map(|(name, _)| name.as_str())
        .collect()
}
