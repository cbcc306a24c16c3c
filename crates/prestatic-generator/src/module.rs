//! ES module rendering for generated files.
//!
//! [`EsModule`] knows the target syntax; the emitter only decides what goes in
//! a module (its header, namespace imports and exported constants).

use serde_json::Value;

use crate::fingerprint::{Fingerprint, GENERATED_MARKER, entry_header};

/// File extension of generated modules.
pub const MODULE_EXTENSION: &str = "mjs";

/// File stem of the aggregate module of a collection or singleton.
pub const INDEX_MODULE: &str = "__index";

/// A namespace import: `import * as <local> from "<path>";`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Local binding name. Must be a valid identifier.
    pub local: String,

    /// Module specifier relative to the importing file.
    pub path: String,
}

/// Builder for the source text of one ES module.
#[derive(Debug, Clone, Default)]
pub struct EsModule {
    header: Option<String>,
    imports: Vec<Import>,
    exports: Vec<(String, String)>,
}

impl EsModule {
    /// Create an empty module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the comment line that opens the module.
    #[must_use]
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Add `import * as local from "path"`.
    pub fn import_namespace(&mut self, local: impl Into<String>, path: impl Into<String>) {
        self.imports.push(Import {
            local: local.into(),
            path: path.into(),
        });
    }

    /// Add `export const name = expression`.
    pub fn export_const(&mut self, name: impl Into<String>, expression: impl Into<String>) {
        self.exports.push((name.into(), expression.into()));
    }

    /// Render the module source.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if let Some(header) = &self.header {
            out.push_str(header);
            out.push('\n');
        }

        for import in &self.imports {
            out.push_str(&format!(
                "import * as {} from {};\n",
                import.local,
                string_literal(&import.path)
            ));
        }

        if !self.imports.is_empty() && !self.exports.is_empty() {
            out.push('\n');
        }

        let exports: Vec<String> = self
            .exports
            .iter()
            .map(|(name, expression)| format!("export const {name} = {expression};\n"))
            .collect();
        out.push_str(&exports.join("\n"));

        out
    }
}

/// Quote a string as a JavaScript string literal.
pub fn string_literal(s: &str) -> String {
    Value::from(s).to_string()
}

const PROTO_KEY: &str = "__proto__";

/// Key under which an object literal stores `key` as an own property.
///
/// A literal `"__proto__": v` sets the prototype instead, so that one key is
/// written in computed form.
pub fn object_key(key: &str) -> String {
    if key == PROTO_KEY {
        format!("[{}]", string_literal(key))
    } else {
        string_literal(key)
    }
}

/// Relative specifier of the module generated for `id`.
///
/// Specifiers are resolved as URLs, so `%`, `#` and `?` are percent-encoded to
/// keep them in the path.
pub fn module_specifier(id: &str) -> String {
    let mut path = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '%' => path.push_str("%25"),
            '#' => path.push_str("%23"),
            '?' => path.push_str("%3F"),
            c => path.push(c),
        }
    }
    format!("./{path}.{MODULE_EXTENSION}")
}

/// Render `value` as a JavaScript expression that rebuilds it exactly.
///
/// This is pretty-printed JSON, except that `__proto__` keys become computed
/// keys. Pretty printing puts every key at the start of its own line, and string
/// contents never span lines, so only real keys are rewritten.
pub fn js_literal(value: &Value) -> serde_json::Result<String> {
    let json = serde_json::to_string_pretty(value)?;
    let proto = format!("{}: ", string_literal(PROTO_KEY));
    if !json.contains(&proto) {
        return Ok(json);
    }

    let lines: Vec<String> = json
        .lines()
        .map(|line| {
            let rest = line.trim_start();
            match rest.strip_prefix(&proto) {
                Some(tail) => {
                    let indent = &line[..line.len() - rest.len()];
                    format!("{indent}{}: {tail}", object_key(PROTO_KEY))
                }
                None => line.to_string(),
            }
        })
        .collect();
    Ok(lines.join("\n"))
}

/// Render the per-entry module exporting `fingerprint` and the compiled `entry`.
pub fn render_entry(fingerprint: &Fingerprint, entry: &Value) -> serde_json::Result<String> {
    let mut module = EsModule::new().with_header(entry_header(fingerprint));
    module.export_const("fingerprint", string_literal(fingerprint.as_str()));
    module.export_const("entry", js_literal(entry)?);
    Ok(module.render())
}

/// Render a collection aggregate mapping every true id to its entry module.
///
/// `bindings` pairs each id with the local name allocated for its import.
pub fn render_collection_index(bindings: &[(String, String)]) -> String {
    let mut module = EsModule::new().with_header(GENERATED_MARKER);

    let mut mapping = String::from("{");
    for (id, local) in bindings {
        module.import_namespace(local, module_specifier(id));
        mapping.push_str(&format!("\n  {}: {local},", object_key(id)));
    }
    if !bindings.is_empty() {
        mapping.push('\n');
    }
    mapping.push('}');

    module.export_const("collection", mapping);
    module.render()
}

/// Render a singleton aggregate re-exporting its one entry module directly.
pub fn render_singleton_index(name: &str, local: &str) -> String {
    let mut module = EsModule::new().with_header(GENERATED_MARKER);
    module.import_namespace(local, module_specifier(name));
    module.export_const("singleton", local);
    module.render()
}
