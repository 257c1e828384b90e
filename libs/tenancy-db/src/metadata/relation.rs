use std::fmt;

/// Referential action applied on delete/update of the referenced row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    #[default]
    NoAction,
}

impl ReferentialAction {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cardinality {
    ManyToOne,
    OneToMany,
    ManyToMany,
}

/// Side-specific part of a relation declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// Owning side; `join_column` holds the target id.
    ManyToOne { join_column: String, optional: bool },
    /// Inverse side of the target's `mapped_by` many-to-one.
    OneToMany { mapped_by: String },
    /// Link rows live in `join_table` (`<source>_id`, `<target>_id`).
    ManyToMany { join_table: String },
}

/// A relation as declared by a module.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct RelationSpec {
    pub name: String,
    pub target: String,
    pub kind: RelationKind,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl RelationSpec {
    pub fn many_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        join_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationKind::ManyToOne {
                join_column: join_column.into(),
                optional: false,
            },
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    pub fn one_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        mapped_by: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationKind::OneToMany {
                mapped_by: mapped_by.into(),
            },
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        join_table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationKind::ManyToMany {
                join_table: join_table.into(),
            },
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::Cascade,
        }
    }

    /// The join column may be null.
    pub fn optional(mut self) -> Self {
        if let RelationKind::ManyToOne { optional, .. } = &mut self.kind {
            *optional = true;
        }
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        match self.kind {
            RelationKind::ManyToOne { .. } => Cardinality::ManyToOne,
            RelationKind::OneToMany { .. } => Cardinality::OneToMany,
            RelationKind::ManyToMany { .. } => Cardinality::ManyToMany,
        }
    }
}

/// How related rows are reached, resolved when the catalog is sealed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationLink {
    /// `target.id = self.<local_column>`
    Owned { local_column: String },
    /// `target.<remote_column> = self.id`
    Inverse { remote_column: String },
    /// Through a join table.
    Linked {
        join_table: String,
        source_column: String,
        target_column: String,
    },
}

/// A sealed relation: declaration plus resolved navigation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    pub spec: RelationSpec,
    pub link: RelationLink,
}

impl Relation {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.spec.target
    }

    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        self.spec.cardinality()
    }

    /// Many-to-one results attach as a single object (or null), everything else
    /// as an array.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.cardinality() == Cardinality::ManyToOne
    }
}

/// Declared or implicit secondary index.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Outgoing foreign key of a table (derived from a many-to-one relation).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub column: String,
    pub target: String,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

/// Link table of a many-to-many relation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinTable {
    pub name: String,
    /// Entity whose schema bootstrap creates this table.
    pub owner: String,
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
}

impl JoinTable {
    #[must_use]
    pub fn foreign_keys(&self) -> [ForeignKey; 2] {
        [
            ForeignKey {
                name: format!("fk_{}_{}", self.name, self.source_column),
                column: self.source_column.clone(),
                target: self.source_table.clone(),
                on_delete: ReferentialAction::Cascade,
                on_update: ReferentialAction::Cascade,
            },
            ForeignKey {
                name: format!("fk_{}_{}", self.name, self.target_column),
                column: self.target_column.clone(),
                target: self.target_table.clone(),
                on_delete: ReferentialAction::Cascade,
                on_update: ReferentialAction::Cascade,
            },
        ]
    }

    /// Same physical table seen from the other side.
    #[must_use]
    pub fn same_shape(&self, other: &JoinTable) -> bool {
        self.name == other.name
            && ((self.source_table == other.source_table
                && self.target_table == other.target_table)
                || (self.source_table == other.target_table
                    && self.target_table == other.source_table))
    }
}

/// Entry of the reverse-navigation index: `from_table.relation` points at the
/// indexed table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRef {
    pub from_table: String,
    pub relation: String,
    pub cardinality: Cardinality,
}
