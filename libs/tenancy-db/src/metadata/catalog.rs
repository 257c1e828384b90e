use std::collections::HashMap;
use std::sync::Arc;

use super::descriptor::EntityDescriptor;
use super::relation::{InboundRef, JoinTable};
use crate::error::{DataError, Result};

/// Immutable set of sealed descriptors, shared by every adapter.
#[derive(Debug)]
pub struct SchemaCatalog {
    entities: Vec<Arc<EntityDescriptor>>,
    join_tables: Vec<JoinTable>,
    inbound: HashMap<String, Vec<InboundRef>>,
}

impl SchemaCatalog {
    pub(crate) fn new(
        entities: Vec<Arc<EntityDescriptor>>,
        join_tables: Vec<JoinTable>,
        inbound: HashMap<String, Vec<InboundRef>>,
    ) -> Self {
        Self {
            entities,
            join_tables,
            inbound,
        }
    }

    /// Descriptor of `table`.
    ///
    /// # Errors
    /// `DataError::Configuration` when the table was never described.
    pub fn entity(&self, table: &str) -> Result<&Arc<EntityDescriptor>> {
        self.get(table)
            .ok_or_else(|| DataError::config(format!("entity '{table}' is not registered")))
    }

    #[must_use]
    pub fn get(&self, table: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.iter().find(|e| e.table() == table)
    }

    /// Descriptors in registration order.
    #[must_use]
    pub fn entities(&self) -> &[Arc<EntityDescriptor>] {
        &self.entities
    }

    #[must_use]
    pub fn join_tables(&self) -> &[JoinTable] {
        &self.join_tables
    }

    #[must_use]
    pub fn join_table(&self, name: &str) -> Option<&JoinTable> {
        self.join_tables.iter().find(|j| j.name == name)
    }

    /// Join tables whose bootstrap belongs to `table`.
    pub fn owned_join_tables<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a JoinTable> {
        self.join_tables.iter().filter(move |j| j.owner == table)
    }

    /// Relations declared elsewhere that point at `table`.
    #[must_use]
    pub fn inbound(&self, table: &str) -> &[InboundRef] {
        self.inbound.get(table).map_or(&[], Vec::as_slice)
    }
}
