//! Resource-level orchestration over the engine primitives.
//!
//! A [`Resource`] ties one [`ResourceSpec`] to its permission hooks, filter
//! set and pagination strategy, and exposes the five canonical operations:
//! fetch one, fetch many, create, update, delete. Everything request-varying
//! flows in through the operation arguments; the `Resource` itself is frozen
//! at registration and shared read-only across handlers.
//!
//! Permission hooks return the predicate that scopes an operation to the rows
//! the caller may touch. For reads a missing row surfaces as `NotFound`; for
//! mutations the merged predicate makes "absent" and "forbidden"
//! indistinguishable by contract.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::exec::{Client, mutate};
use crate::filter::{FilterDecl, FilterSet};
use crate::page::{LimitOffsetPagination, PageMeta, Paginator};
use crate::query::build::SelectQuery;
use crate::query::predicate::{Predicate, col, lit};
use crate::query::render::SqlRenderer;
use crate::resource::ResourceSpec;
use crate::value::{Row, SqlValue};

/// Request-scoped inputs a permission hook may consult.
#[derive(Debug, Clone, Copy)]
pub struct PermissionScope<'a> {
    /// Identity of the caller, when the surrounding layer has one.
    pub caller: Option<&'a str>,
    /// Mutation payload; empty for reads and deletes.
    pub payload: &'a [(String, SqlValue)],
}

/// Produces the permission predicate for one operation, or `None` for no
/// narrowing.
pub type PermissionFn = Arc<dyn Fn(&PermissionScope<'_>) -> Option<Predicate> + Send + Sync>;

/// Per-operation hooks. Fetch-many, update and delete fall back to the read
/// hook when they have no hook of their own; create never does, since a
/// row-scoping read predicate rarely makes sense for rows that do not exist
/// yet.
#[derive(Clone, Default)]
struct Permissions {
    read: Option<PermissionFn>,
    list: Option<PermissionFn>,
    create: Option<PermissionFn>,
    update: Option<PermissionFn>,
    delete: Option<PermissionFn>,
}

impl std::fmt::Debug for Permissions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permissions")
            .field("read", &self.read.is_some())
            .field("list", &self.list.is_some())
            .field("create", &self.create.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .finish()
    }
}

impl Permissions {
    fn read_predicate(&self, scope: &PermissionScope<'_>) -> Option<Predicate> {
        self.read.as_ref().and_then(|hook| hook(scope))
    }

    fn list_predicate(&self, scope: &PermissionScope<'_>) -> Option<Predicate> {
        match &self.list {
            Some(hook) => hook(scope),
            None => self.read_predicate(scope),
        }
    }

    fn create_predicate(&self, scope: &PermissionScope<'_>) -> Option<Predicate> {
        self.create.as_ref().and_then(|hook| hook(scope))
    }

    fn update_predicate(&self, scope: &PermissionScope<'_>) -> Option<Predicate> {
        match &self.update {
            Some(hook) => hook(scope),
            None => self.read_predicate(scope),
        }
    }

    fn delete_predicate(&self, scope: &PermissionScope<'_>) -> Option<Predicate> {
        match &self.delete {
            Some(hook) => hook(scope),
            None => self.read_predicate(scope),
        }
    }
}

/// One registered resource: descriptor, filters, pagination and permissions,
/// frozen after [`ResourceBuilder::register`].
#[derive(Clone, Debug)]
pub struct Resource {
    spec: Arc<ResourceSpec>,
    filters: FilterSet,
    paginator: Paginator,
    permissions: Permissions,
}

impl Resource {
    pub fn builder(spec: ResourceSpec) -> ResourceBuilder {
        ResourceBuilder::new(spec)
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    pub fn table(&self) -> &str {
        self.spec.table()
    }

    /// Selects one row by primary key under the read permission. A row that
    /// does not exist and a row the caller may not see are both `NotFound`.
    pub async fn fetch_one(
        &self,
        client: &mut dyn Client,
        caller: Option<&str>,
        pk: impl Into<SqlValue>,
    ) -> Result<Row, EngineError> {
        let scope = PermissionScope { caller, payload: &[] };
        let mut query = SelectQuery::from(self.spec.table());
        if let Some(permission) = self.permissions.read_predicate(&scope) {
            query = query.and_where(permission);
        }
        query = query.and_where(Predicate::eq(col(self.spec.primary_key()), lit(pk.into())));

        let statement = SqlRenderer::new(client.dialect()).select(&query);
        debug!(table = %self.spec.table(), "fetch one");
        let row = client.fetch_optional(&statement).await?;
        row.ok_or_else(|| EngineError::NotFound {
            table: self.spec.table().to_string(),
        })
    }

    /// Selects rows under the list permission, with filters applied from
    /// `params` and the page cut by the configured paginator.
    pub async fn fetch_many(
        &self,
        client: &mut dyn Client,
        caller: Option<&str>,
        params: &BTreeMap<String, String>,
    ) -> Result<(Vec<Row>, PageMeta), EngineError> {
        let scope = PermissionScope { caller, payload: &[] };
        let mut query = SelectQuery::from(self.spec.table());
        if let Some(permission) = self.permissions.list_predicate(&scope) {
            query = query.and_where(permission);
        }
        let query = self.filters.apply(query, params, self.paginator.param_keys())?;
        debug!(table = %self.spec.table(), "fetch many");
        self.paginator.fetch_page(client, query, params).await
    }

    pub async fn create(
        &self,
        client: &mut dyn Client,
        caller: Option<&str>,
        payload: Vec<(String, SqlValue)>,
    ) -> Result<Row, EngineError> {
        let scope = PermissionScope {
            caller,
            payload: &payload,
        };
        let permission = self.permissions.create_predicate(&scope);
        mutate::create(client, &self.spec, payload, permission).await
    }

    /// Updates one row by primary key under the update permission. An empty
    /// patch is acknowledged without touching the database and yields an
    /// empty row.
    pub async fn update(
        &self,
        client: &mut dyn Client,
        caller: Option<&str>,
        pk: impl Into<SqlValue>,
        payload: Vec<(String, SqlValue)>,
    ) -> Result<Row, EngineError> {
        if payload.is_empty() {
            debug!(table = %self.spec.table(), "empty patch, nothing to update");
            return Ok(Row::new(Vec::new(), Vec::new()));
        }
        let scope = PermissionScope {
            caller,
            payload: &payload,
        };
        // pk equality goes first so key recovery on non-returning dialects
        // finds it ahead of any permission conjunct
        let mut predicate = Predicate::eq(col(self.spec.primary_key()), lit(pk.into()));
        if let Some(permission) = self.permissions.update_predicate(&scope) {
            predicate = predicate.and(permission);
        }
        mutate::update(client, &self.spec, payload, predicate).await
    }

    pub async fn delete(
        &self,
        client: &mut dyn Client,
        caller: Option<&str>,
        pk: impl Into<SqlValue>,
    ) -> Result<(), EngineError> {
        let scope = PermissionScope { caller, payload: &[] };
        let mut predicate = Predicate::eq(col(self.spec.primary_key()), lit(pk.into()));
        if let Some(permission) = self.permissions.delete_predicate(&scope) {
            predicate = predicate.and(permission);
        }
        mutate::delete(client, &self.spec, predicate).await
    }
}

pub struct ResourceBuilder {
    spec: ResourceSpec,
    filter_decls: Vec<FilterDecl>,
    paginator: Option<Paginator>,
    permissions: Permissions,
}

impl ResourceBuilder {
    pub fn new(spec: ResourceSpec) -> Self {
        Self {
            spec,
            filter_decls: Vec::new(),
            paginator: None,
            permissions: Permissions::default(),
        }
    }

    /// Declares an equality filter on the named column.
    pub fn filter_field(mut self, name: impl Into<String>) -> Self {
        self.filter_decls.push(FilterDecl::field(name));
        self
    }

    pub fn filter(mut self, declaration: FilterDecl) -> Self {
        self.filter_decls.push(declaration);
        self
    }

    pub fn paginator(mut self, paginator: Paginator) -> Self {
        self.paginator = Some(paginator);
        self
    }

    /// Base permission for reads; fetch-many, update and delete inherit it
    /// unless they set their own hook.
    pub fn read_permission(
        mut self,
        hook: impl Fn(&PermissionScope<'_>) -> Option<Predicate> + Send + Sync + 'static,
    ) -> Self {
        self.permissions.read = Some(Arc::new(hook));
        self
    }

    pub fn list_permission(
        mut self,
        hook: impl Fn(&PermissionScope<'_>) -> Option<Predicate> + Send + Sync + 'static,
    ) -> Self {
        self.permissions.list = Some(Arc::new(hook));
        self
    }

    pub fn create_permission(
        mut self,
        hook: impl Fn(&PermissionScope<'_>) -> Option<Predicate> + Send + Sync + 'static,
    ) -> Self {
        self.permissions.create = Some(Arc::new(hook));
        self
    }

    pub fn update_permission(
        mut self,
        hook: impl Fn(&PermissionScope<'_>) -> Option<Predicate> + Send + Sync + 'static,
    ) -> Self {
        self.permissions.update = Some(Arc::new(hook));
        self
    }

    pub fn delete_permission(
        mut self,
        hook: impl Fn(&PermissionScope<'_>) -> Option<Predicate> + Send + Sync + 'static,
    ) -> Self {
        self.permissions.delete = Some(Arc::new(hook));
        self
    }

    /// Resolves filters against the descriptor and freezes the resource.
    /// Defaults to limit/offset pagination from `config` when no paginator
    /// was chosen.
    pub fn register(self, config: &EngineConfig) -> Result<Resource, EngineError> {
        let filters = FilterSet::resolve(&self.spec, self.filter_decls, config)?;
        let paginator = self
            .paginator
            .unwrap_or_else(|| Paginator::LimitOffset(LimitOffsetPagination::from_config(config)));
        info!(table = %self.spec.table(), "resource registered");
        Ok(Resource {
            spec: Arc::new(self.spec),
            filters,
            paginator,
            permissions: self.permissions,
        })
    }
}

/// Process-wide map of registered resources. Built during startup, read by
/// every request handler afterwards.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: RwLock<HashMap<String, Arc<Resource>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, resource: Resource) -> Result<Arc<Resource>, EngineError> {
        let mut resources = self.resources.write();
        let table = resource.table().to_string();
        if resources.contains_key(&table) {
            return Err(EngineError::registration(format!(
                "resource '{table}' is already registered"
            )));
        }
        let resource = Arc::new(resource);
        resources.insert(table, Arc::clone(&resource));
        Ok(resource)
    }

    pub fn get(&self, table: &str) -> Option<Arc<Resource>> {
        self.resources.read().get(table).cloned()
    }

    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.resources.read().keys().cloned().collect();
        tables.sort();
        tables
    }
}
