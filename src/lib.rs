//! Authorization-safe, cross-dialect SQL mutation engine.
//!
//! A resource is described once (table, primary key, columns, defaults) and
//! every mutation against it carries the caller's permission as a query
//! predicate, so the database enforces authorization atomically with the
//! write. On top of that sit RETURNING emulation for engines without native
//! support, translation of dialect-specific constraint violations into
//! field-addressable errors, and pagination/filtering for listings.

pub mod config;
pub mod dialect;
pub mod error;
pub mod exec;
pub mod filter;
pub mod page;
pub mod query;
pub mod resource;
pub mod resource_api;
pub mod value;
pub mod violation;

pub use crate::config::EngineConfig;
pub use crate::dialect::Dialect;
pub use crate::error::{EngineError, EngineErrorCode, FieldError};
pub use crate::query::predicate::{CmpOp, Predicate, col, lit};
pub use crate::resource::{ColumnSpec, ResourceSpec};
pub use crate::resource_api::{PermissionScope, Resource, ResourceBuilder, ResourceRegistry};
pub use crate::value::{ColumnKind, Row, SqlValue};

use std::sync::Arc;

/// Shared entry point: one engine-wide configuration plus the registry of
/// resources built against it.
pub struct Engine {
    config: EngineConfig,
    registry: ResourceRegistry,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: ResourceRegistry::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Finalizes `builder` against the engine configuration and registers the
    /// resource under its table name.
    pub fn register(&self, builder: ResourceBuilder) -> Result<Arc<Resource>, EngineError> {
        let resource = builder.register(&self.config)?;
        self.registry.register(resource)
    }

    pub fn resource(&self, table: &str) -> Option<Arc<Resource>> {
        self.registry.get(table)
    }

    pub fn tables(&self) -> Vec<String> {
        self.registry.tables()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
