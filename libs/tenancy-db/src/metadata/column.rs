use serde_json::Value;
use tenancy_query::FieldKind;

/// Semantic type of a column, shared by both engines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    /// Text restricted to the listed variants.
    Enum(Vec<String>),
    Json,
}

impl ColumnType {
    pub fn enumeration<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnType::Enum(variants.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match self {
            ColumnType::Uuid => FieldKind::Uuid,
            ColumnType::String => FieldKind::String,
            ColumnType::Integer => FieldKind::Integer,
            ColumnType::Float => FieldKind::Float,
            ColumnType::Boolean => FieldKind::Boolean,
            ColumnType::DateTime => FieldKind::DateTime,
            ColumnType::Enum(_) => FieldKind::Enum,
            ColumnType::Json => FieldKind::Json,
        }
    }
}

/// One persistent field: name, semantic type, nullability and default.
#[derive(Clone, Debug, PartialEq)]
#[must_use]
pub struct ColumnSpec {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<Value>,
    pub primary_key: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            default: None,
            primary_key: false,
        }
    }

    pub fn uuid(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Uuid)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::DateTime)
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Json)
    }

    pub fn enumeration<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, ColumnType::enumeration(variants))
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub(crate) fn is_uuid(&self) -> bool {
        self.ty == ColumnType::Uuid
    }

    pub(crate) fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }
}
