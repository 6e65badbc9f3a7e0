//! Capability grants on tables
//!
//! Grants are explicit allow-list edges from a table to a named principal.
//! Compute never touches [`TableStorage`] directly; it holds a
//! [`StoreClient`] scoped to one principal, and every operation is checked
//! against the grant set first.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::storage::{Item, StoreError, TableStorage};

/// The access an operation needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Capability granted on a (table, principal) edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
    ReadWrite,
}

impl Capability {
    pub fn allows(&self, mode: AccessMode) -> bool {
        match self {
            Self::ReadWrite => true,
            Self::Read => mode == AccessMode::Read,
            Self::Write => mode == AccessMode::Write,
        }
    }
}

/// Allow-list of capability edges, keyed by (table, principal)
#[derive(Debug, Default)]
pub struct GrantSet {
    edges: DashMap<(String, String), Capability>,
}

impl GrantSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, table: &str, principal: &str, capability: Capability) {
        debug!(table, principal, ?capability, "recording grant");
        self.edges
            .insert((table.to_string(), principal.to_string()), capability);
    }

    pub fn grant_read(&self, table: &str, principal: &str) {
        self.grant(table, principal, Capability::Read);
    }

    pub fn grant_read_write(&self, table: &str, principal: &str) {
        self.grant(table, principal, Capability::ReadWrite);
    }

    /// Check that `principal` may perform `mode` on `table`
    pub fn check(&self, table: &str, principal: &str, mode: AccessMode) -> Result<(), StoreError> {
        let allowed = self
            .edges
            .get(&(table.to_string(), principal.to_string()))
            .map_or(false, |cap| cap.allows(mode));

        if allowed {
            Ok(())
        } else {
            Err(StoreError::AccessDenied {
                table: table.to_string(),
                principal: principal.to_string(),
                mode,
            })
        }
    }

    /// All (principal, capability) edges recorded for a table
    pub fn grants_for(&self, table: &str) -> Vec<(String, Capability)> {
        let mut grants: Vec<_> = self
            .edges
            .iter()
            .filter(|e| e.key().0 == table)
            .map(|e| (e.key().1.clone(), *e.value()))
            .collect();
        grants.sort_by(|a, b| a.0.cmp(&b.0));
        grants
    }
}

/// Grant-checked store handle held by one principal
///
/// This is the only path compute has to the store; the table storage itself
/// is never handed out.
#[derive(Clone)]
pub struct StoreClient {
    storage: Arc<TableStorage>,
    grants: Arc<GrantSet>,
    principal: String,
}

impl StoreClient {
    pub fn new(storage: Arc<TableStorage>, grants: Arc<GrantSet>, principal: impl Into<String>) -> Self {
        Self {
            storage,
            grants,
            principal: principal.into(),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn put_item(&self, table: &str, item: Item) -> Result<Item, StoreError> {
        self.grants.check(table, &self.principal, AccessMode::Write)?;
        self.storage.put_item(table, item)
    }

    pub fn get_item(&self, table: &str, key: &str) -> Result<Option<Item>, StoreError> {
        self.grants.check(table, &self.principal, AccessMode::Read)?;
        self.storage.get_item(table, key)
    }

    pub fn delete_item(&self, table: &str, key: &str) -> Result<(), StoreError> {
        self.grants.check(table, &self.principal, AccessMode::Write)?;
        self.storage.delete_item(table, key)
    }

    pub fn scan(&self, table: &str) -> Result<Vec<Item>, StoreError> {
        self.grants.check(table, &self.principal, AccessMode::Read)?;
        self.storage.scan(table)
    }
}
