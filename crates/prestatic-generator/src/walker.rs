//! Schema-driven traversal of entry values.
//!
//! [`walk`] descends an entry and its schema in lock-step and hands every form
//! leaf to a visitor together with a mutable slot holding the leaf's value.
//! Sibling array elements and object fields are visited in parallel; each slot
//! is disjoint, so visitors never observe each other's writes.

use indexmap::IndexMap;
use prestatic_core::{EntryPath, FieldSchema, FormField, Schema, frontmatter::type_name};
use rayon::prelude::*;
use serde_json::{Map, Value};
use thiserror::Error;

/// Traversal errors.
#[derive(Debug, Error)]
pub enum WalkError {
    /// The value does not have the shape its schema node requires.
    #[error("schema contract violation at {path}: {message}")]
    SchemaContract { path: EntryPath, message: String },

    /// The schema uses a node kind that has no traversal semantics.
    #[error("unsupported `{kind}` field at {path}")]
    Unsupported { path: EntryPath, kind: &'static str },
}

impl WalkError {
    fn contract(path: &EntryPath, message: impl Into<String>) -> Self {
        Self::SchemaContract {
            path: path.clone(),
            message: message.into(),
        }
    }

    /// Location of the offending node.
    pub fn path(&self) -> &EntryPath {
        match self {
            Self::SchemaContract { path, .. } | Self::Unsupported { path, .. } => path,
        }
    }
}

/// A form leaf reached by the walker.
#[derive(Debug)]
pub struct FormLeaf<'a> {
    /// Descriptor of the form field.
    pub field: &'a FormField,

    /// Location of the leaf inside the entry.
    pub path: EntryPath,

    /// The leaf's value. Overwriting it replaces the value in the parent container.
    pub value: &'a mut Value,
}

/// Walk `entry` against its root `schema`, calling `visit` once per form leaf.
///
/// The entry root must be a mapping. The first error returned by the visitor,
/// or the first shape mismatch, stops the traversal.
pub fn walk<F, E>(schema: &Schema, entry: &mut Value, visit: &F) -> Result<(), E>
where
    F: Fn(FormLeaf<'_>) -> Result<(), E> + Sync,
    E: From<WalkError> + Send,
{
    let root = EntryPath::root();
    match entry {
        Value::Object(map) => walk_fields(schema, map, &root, visit),
        other => Err(WalkError::contract(
            &root,
            format!("entry root must be an object, found {}", type_name(other)),
        )
        .into()),
    }
}

fn walk_node<F, E>(
    node: &FieldSchema,
    value: &mut Value,
    path: &EntryPath,
    visit: &F,
) -> Result<(), E>
where
    F: Fn(FormLeaf<'_>) -> Result<(), E> + Sync,
    E: From<WalkError> + Send,
{
    match node {
        FieldSchema::Array { element } => {
            let Value::Array(items) = value else {
                return Err(mismatch(path, "array", value).into());
            };
            items
                .par_iter_mut()
                .enumerate()
                .try_for_each(|(index, item)| walk_node(element, item, &path.index(index), visit))
        }

        FieldSchema::Object { fields } => {
            let Value::Object(map) = value else {
                return Err(mismatch(path, "object", value).into());
            };
            walk_fields(fields, map, path, visit)
        }

        FieldSchema::Conditional { values } => {
            let Value::Object(map) = value else {
                return Err(mismatch(path, "conditional", value).into());
            };

            let discriminant = match map.get("discriminant") {
                Some(Value::String(d)) => d.clone(),
                Some(other) => {
                    return Err(WalkError::contract(
                        path,
                        format!(
                            "conditional discriminant must be a string, found {}",
                            type_name(other)
                        ),
                    )
                    .into());
                }
                None => {
                    return Err(
                        WalkError::contract(path, "conditional is missing `discriminant`").into(),
                    );
                }
            };

            let Some(variant) = values.get(&discriminant) else {
                return Err(WalkError::contract(
                    path,
                    format!("unknown conditional discriminant `{discriminant}`"),
                )
                .into());
            };

            let Some(inner) = map.get_mut("value") else {
                return Err(WalkError::contract(path, "conditional is missing `value`").into());
            };

            walk_node(variant, inner, path, visit)
        }

        FieldSchema::Form(field) => visit(FormLeaf {
            field,
            path: path.clone(),
            value,
        }),

        FieldSchema::Child => Err(WalkError::Unsupported {
            path: path.clone(),
            kind: node.kind_name(),
        }
        .into()),
    }
}

fn walk_fields<F, E>(
    fields: &IndexMap<String, FieldSchema>,
    map: &mut Map<String, Value>,
    path: &EntryPath,
    visit: &F,
) -> Result<(), E>
where
    F: Fn(FormLeaf<'_>) -> Result<(), E> + Sync,
    E: From<WalkError> + Send,
{
    if let Some(key) = map.keys().find(|key| !fields.contains_key(*key)) {
        let message = format!("field `{key}` is not declared in the schema");
        return Err(WalkError::contract(path, message).into());
    }

    let slots: Vec<(&String, &mut Value)> = map.iter_mut().collect();
    slots.into_par_iter().try_for_each(|(key, value)| match fields.get(key) {
        Some(node) => walk_node(node, value, &path.field(key), visit),
        None => Ok(()),
    })
}

fn mismatch(path: &EntryPath, expected: &str, found: &Value) -> WalkError {
    WalkError::contract(
        path,
        format!("expected {expected} value, found {}", type_name(found)),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use prestatic_core::FormKind;
    use serde_json::json;

    use super::*;

    fn schema(fields: Vec<(&str, FieldSchema)>) -> Schema {
        fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    /// Upper-cases content leaves and records every visited path.
    fn run(schema: &Schema, entry: &mut Value) -> Result<Vec<String>, WalkError> {
        let visited = Mutex::new(Vec::new());
        walk(schema, entry, &|leaf: FormLeaf<'_>| {
            visited.lock().expect("lock").push(leaf.path.to_string());
            if leaf.field.form_kind.is_content() {
                if let Value::String(raw) = &*leaf.value {
                    let upper = raw.to_uppercase();
                    *leaf.value = Value::String(upper);
                }
            }
            Ok::<_, WalkError>(())
        })?;
        let mut visited = visited.into_inner().expect("lock");
        visited.sort();
        Ok(visited)
    }

    #[test]
    fn test_walk_flat_object() {
        let schema = schema(vec![
            ("title", FieldSchema::form("text")),
            ("summary", FieldSchema::content()),
        ]);
        let mut entry = json!({ "title": "Hello", "summary": "# hi" });

        let visited = run(&schema, &mut entry).expect("walk");

        assert_eq!(visited, vec!["summary", "title"]);
        assert_eq!(entry, json!({ "title": "Hello", "summary": "# HI" }));
    }

    #[test]
    fn test_walk_array_of_objects() {
        let schema = schema(vec![(
            "sections",
            FieldSchema::array(FieldSchema::object([
                ("title", FieldSchema::form("text")),
                ("content", FieldSchema::content()),
            ])),
        )]);
        let mut entry = json!({
            "sections": [
                { "title": "a", "content": "one" },
                { "title": "b", "content": "two" },
            ]
        });

        let visits = Mutex::new(0);
        walk(&schema, &mut entry, &|leaf: FormLeaf<'_>| {
            if leaf.field.form_kind == FormKind::Content {
                *visits.lock().expect("lock") += 1;
                *leaf.value = json!("compiled");
            }
            Ok::<_, WalkError>(())
        })
        .expect("walk");

        assert_eq!(visits.into_inner().expect("lock"), 2);
        assert_eq!(entry["sections"][0]["content"], "compiled");
        assert_eq!(entry["sections"][1]["content"], "compiled");
        assert_eq!(entry["sections"][1]["title"], "b");
    }

    #[test]
    fn test_conditional_is_transparent_to_path() {
        let schema = schema(vec![(
            "hero",
            FieldSchema::conditional([
                ("quote", FieldSchema::object([("text", FieldSchema::content())])),
                ("none", FieldSchema::form("empty")),
            ]),
        )]);
        let mut entry = json!({
            "hero": { "discriminant": "quote", "value": { "text": "wise" } }
        });

        let visited = run(&schema, &mut entry).expect("walk");

        assert_eq!(visited, vec!["hero.text"]);
        assert_eq!(entry["hero"]["value"]["text"], "WISE");
        assert_eq!(entry["hero"]["discriminant"], "quote");
    }

    #[test]
    fn test_unknown_discriminant_is_contract_violation() {
        let schema = schema(vec![(
            "hero",
            FieldSchema::conditional([("image", FieldSchema::form("image"))]),
        )]);
        let mut entry = json!({ "hero": { "discriminant": "text", "value": "x" } });

        let err = run(&schema, &mut entry).expect_err("unknown discriminant");
        assert!(matches!(err, WalkError::SchemaContract { .. }));
        assert!(err.to_string().contains("unknown conditional discriminant `text`"));
    }

    #[test]
    fn test_nested_arrays_visit_every_leaf() {
        let schema = schema(vec![(
            "grid",
            FieldSchema::array(FieldSchema::array(FieldSchema::content())),
        )]);
        let mut entry = json!({ "grid": [["a", "b", "c"], ["d"], []] });

        let visited = run(&schema, &mut entry).expect("walk");

        assert_eq!(
            visited,
            vec!["grid[0][0]", "grid[0][1]", "grid[0][2]", "grid[1][0]"]
        );
        assert_eq!(entry, json!({ "grid": [["A", "B", "C"], ["D"], []] }));
    }

    #[test]
    fn test_content_visits_scale_with_array_length() {
        const ITEMS: usize = 25;

        let schema = schema(vec![(
            "sections",
            FieldSchema::array(FieldSchema::object([
                ("title", FieldSchema::form("text")),
                ("intro", FieldSchema::content()),
                ("body", FieldSchema::content()),
            ])),
        )]);
        let sections: Vec<Value> = (0..ITEMS)
            .map(|i| json!({ "title": format!("s{i}"), "intro": "i", "body": "b" }))
            .collect();
        let mut entry = json!({ "sections": sections });

        let compiled = AtomicUsize::new(0);
        walk(&schema, &mut entry, &|leaf: FormLeaf<'_>| {
            if leaf.field.form_kind.is_content() {
                compiled.fetch_add(1, Ordering::SeqCst);
            }
            Ok::<_, WalkError>(())
        })
        .expect("walk");

        assert_eq!(compiled.load(Ordering::SeqCst), ITEMS * 2);
    }

    #[test]
    fn test_conditional_inside_array() {
        let schema = schema(vec![(
            "blocks",
            FieldSchema::array(FieldSchema::conditional([
                ("text", FieldSchema::object([("body", FieldSchema::content())])),
                ("image", FieldSchema::form("image")),
            ])),
        )]);
        let mut entry = json!({
            "blocks": [
                { "discriminant": "text", "value": { "body": "one" } },
                { "discriminant": "image", "value": "a.png" },
                { "discriminant": "text", "value": { "body": "two" } },
            ]
        });

        let visited = run(&schema, &mut entry).expect("walk");

        assert_eq!(visited, vec!["blocks[0].body", "blocks[1]", "blocks[2].body"]);
        assert_eq!(entry["blocks"][0]["value"]["body"], "ONE");
        assert_eq!(entry["blocks"][1]["value"], "a.png");
        assert_eq!(entry["blocks"][2]["value"]["body"], "TWO");
    }

    #[test]
    fn test_non_string_discriminant_is_contract_violation() {
        let schema = schema(vec![(
            "hero",
            FieldSchema::conditional([("1", FieldSchema::form("text"))]),
        )]);
        let mut entry = json!({ "hero": { "discriminant": 1, "value": "x" } });

        let err = run(&schema, &mut entry).expect_err("numeric discriminant");
        assert!(matches!(err, WalkError::SchemaContract { .. }));
        assert_eq!(err.path().to_string(), "hero");
        assert!(err.to_string().contains("discriminant must be a string, found number"));
    }

    #[test]
    fn test_conditional_missing_value_is_contract_violation() {
        let schema = schema(vec![(
            "blocks",
            FieldSchema::array(FieldSchema::conditional([(
                "quote",
                FieldSchema::content(),
            )])),
        )]);
        let mut entry = json!({ "blocks": [{ "discriminant": "quote" }] });

        let err = run(&schema, &mut entry).expect_err("missing value");
        assert!(matches!(err, WalkError::SchemaContract { .. }));
        assert_eq!(err.path().to_string(), "blocks[0]");
        assert!(err.to_string().contains("conditional is missing `value`"));
    }

    #[test]
    fn test_array_schema_with_scalar_value() {
        let schema = schema(vec![("tags", FieldSchema::array(FieldSchema::form("text")))]);
        let mut entry = json!({ "tags": "rust" });

        let err = run(&schema, &mut entry).expect_err("mismatch");
        assert_eq!(err.path().to_string(), "tags");
        assert!(err.to_string().contains("expected array value, found string"));
    }

    #[test]
    fn test_foreign_key_is_contract_violation() {
        let schema = schema(vec![("title", FieldSchema::form("text"))]);
        let mut entry = json!({ "title": "a", "extra": 1 });

        let err = run(&schema, &mut entry).expect_err("foreign key");
        assert!(err.to_string().contains("`extra` is not declared"));
    }

    #[test]
    fn test_missing_fields_are_not_visited() {
        let schema = schema(vec![
            ("title", FieldSchema::form("text")),
            ("body", FieldSchema::content()),
        ]);
        let mut entry = json!({ "title": "only title" });

        let visited = run(&schema, &mut entry).expect("walk");
        assert_eq!(visited, vec!["title"]);
    }

    #[test]
    fn test_child_field_is_unsupported() {
        let schema = schema(vec![(
            "blocks",
            FieldSchema::array(FieldSchema::object([("doc", FieldSchema::Child)])),
        )]);
        let mut entry = json!({ "blocks": [{ "doc": "x" }] });

        let err = run(&schema, &mut entry).expect_err("child");
        assert!(matches!(err, WalkError::Unsupported { kind: "child", .. }));
        assert_eq!(err.path().to_string(), "blocks[0].doc");
    }

    #[test]
    fn test_non_object_root() {
        let schema = schema(vec![]);
        let mut entry = json!([1, 2]);
        let err = run(&schema, &mut entry).expect_err("root");
        assert!(err.to_string().contains("entry root must be an object"));
    }

    #[test]
    fn test_visitor_error_stops_walk() {
        #[derive(Debug)]
        enum TestError {
            Walk(WalkError),
            Visitor,
        }
        impl From<WalkError> for TestError {
            fn from(err: WalkError) -> Self {
                Self::Walk(err)
            }
        }

        let schema = schema(vec![("body", FieldSchema::content())]);
        let mut entry = json!({ "body": "x" });
        let result = walk(&schema, &mut entry, &|_leaf: FormLeaf<'_>| Err(TestError::Visitor));

        assert!(matches!(result, Err(TestError::Visitor)));
    }
}
