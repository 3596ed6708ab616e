//! Hierarchical resource names.

/// The name of a lockable resource: an ordered path from the hierarchy
/// root, e.g. `database/orders/3` for page 3 of the orders table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName {
    parts: Vec<String>,
}

impl ResourceName {
    /// A name at the root of the hierarchy.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            parts: vec![name.into()],
        }
    }

    /// The name of a child of this resource.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut parts = self.parts.clone();
        parts.push(name.into());
        Self { parts }
    }

    /// The parent name, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.parts.len() <= 1 {
            return None;
        }
        Some(Self {
            parts: self.parts[..self.parts.len() - 1].to_vec(),
        })
    }

    /// Whether `self` is a strict descendant of `other`.
    #[must_use]
    pub fn is_descendant_of(&self, other: &Self) -> bool {
        self.parts.len() > other.parts.len() && self.parts[..other.parts.len()] == other.parts[..]
    }

    /// Path components from the root downward.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(String::as_str)
    }

    /// The final path component.
    #[must_use]
    #[allow(clippy::missing_panics_doc)] // parts is never empty by construction
    pub fn leaf(&self) -> &str {
        self.parts
            .last()
            .expect("resource name has at least one component")
    }

    /// Number of path components.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.parts.len()
    }
}

impl std::fmt::Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.parts.join("/"))
    }
}
