//! Module-scope identifiers for aggregate import bindings.

use std::collections::HashSet;

/// ECMAScript reserved words, including strict-mode and module-only ones.
const RESERVED: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Map an arbitrary entry id onto a valid identifier.
///
/// Characters outside `[A-Za-z0-9_$]` become `_`, a leading digit gets an `_`
/// prefix, and so do the empty string and reserved words.
pub fn sanitize(raw: &str) -> String {
    let mut ident: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let valid_start = ident
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');

    if !valid_start || RESERVED.contains(&ident.as_str()) {
        ident.insert(0, '_');
    }

    ident
}

/// Hands out distinct identifiers within one generated module.
///
/// Ids that sanitize to an identifier already taken get `_2`, `_3`, ... appended.
#[derive(Debug, Default)]
pub struct IdentifierAllocator {
    taken: HashSet<String>,
}

impl IdentifierAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh identifier for `raw`.
    pub fn allocate(&mut self, raw: &str) -> String {
        let base = sanitize(raw);
        if self.taken.insert(base.clone()) {
            return base;
        }

        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
