use super::document::StoredDocument;
use super::kinds::ResourceKind;
use serde_json::Value;

/// Conjunctive filter over stored documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub kind: Option<ResourceKind>,
    pub link_prefix: Option<String>,
    pub field_equals: Vec<(String, Value)>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_kind(kind: ResourceKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn with_link_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.link_prefix = Some(prefix.into());
        self
    }

    /// Require a (dot separated) body field to equal `value`
    pub fn field_eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field_equals.push((path.into(), value.into()));
        self
    }

    pub fn matches(&self, document: &StoredDocument) -> bool {
        if let Some(kind) = self.kind {
            if document.kind() != Some(kind) {
                return false;
            }
        }
        if let Some(prefix) = &self.link_prefix {
            if !document.link.starts_with(prefix.as_str()) {
                return false;
            }
        }
        self.field_equals
            .iter()
            .all(|(path, expected)| document.field(path) == Some(expected))
    }
}
