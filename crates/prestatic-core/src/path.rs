//! Locations inside an entry's value tree.

use std::fmt;

/// One step from a container to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PathSegment {
    /// A named field of an object.
    Field(String),
    /// An element of an array.
    Index(usize),
}

/// Ordered segments from the entry root to a node.
///
/// Conditional wrappers do not contribute a segment: the path of a field inside
/// a conditional's `value` is the same as if the conditional were not there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EntryPath {
    segments: Vec<PathSegment>,
}

impl EntryPath {
    /// The path of the entry root.
    pub fn root() -> Self {
        Self::default()
    }

    /// A new path extended with a field name.
    #[must_use]
    pub fn field(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Field(name.to_string()));
        Self { segments }
    }

    /// A new path extended with an array index.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<root>");
        }

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => write!(f, "{name}")?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_display() {
        assert_eq!(EntryPath::root().to_string(), "<root>");
    }

    #[test]
    fn test_nested_display() {
        let path = EntryPath::root().field("sections").index(0).field("content");
        assert_eq!(path.to_string(), "sections[0].content");
    }

    #[test]
    fn test_extending_does_not_mutate_parent() {
        let parent = EntryPath::root().field("a");
        let _child = parent.field("b");
        assert_eq!(parent.to_string(), "a");
    }
}
