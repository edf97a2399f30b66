use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    Url,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSchema {
    #[must_use]
    pub const fn required(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self { name, kind, required: true, description, default: None }
    }

    #[must_use]
    pub const fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self { name, kind, required: false, description, default: None }
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Data-only description of a channel type's config, for documentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSchema {
    pub fields: Vec<FieldSchema>,
    /// Accepted recipient type tags.
    pub recipient_types: Vec<&'static str>,
}

impl ConfigSchema {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.required)
    }
}
