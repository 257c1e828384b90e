//! Field whitelist consulted by the normalizer.
//!
//! The data layer implements [`FieldCatalog`] for its entity descriptors; this
//! crate only needs to know which names exist and what kind of value they hold.

/// Coarse value kind of a declared field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Uuid,
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Enum,
    Json,
}

impl FieldKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Uuid => "uuid",
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::DateTime => "datetime",
            FieldKind::Enum => "enum",
            FieldKind::Json => "json",
        }
    }

    /// Kinds that may appear in `where` and `order`.
    #[must_use]
    pub fn is_queryable(self) -> bool {
        !matches!(self, FieldKind::Json)
    }

    /// Kinds whose values are carried as JSON strings.
    #[must_use]
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            FieldKind::Uuid | FieldKind::String | FieldKind::DateTime | FieldKind::Enum
        )
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait FieldCatalog {
    /// Name used in error messages (the table name).
    fn entity_name(&self) -> &str;

    /// Kind of a declared field, `None` when the field does not exist.
    fn field_kind(&self, field: &str) -> Option<FieldKind>;

    /// Whether `relation` is declared on this entity.
    fn has_relation(&self, relation: &str) -> bool;
}
