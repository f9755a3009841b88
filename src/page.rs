//! Pagination strategies: limit/offset and page-number, each combinable with
//! a counting mode.
//!
//! Counting is where the strategies earn their keep. `Lazy` just reports how
//! many rows came back. The eager modes report the total matching rows before
//! truncation, either through a separate `COUNT(1)` round trip or by riding a
//! decorrelated scalar count column on the page query itself. Eager counting
//! only fires when truncation was actually requested; an unpaginated fetch
//! always advertises the fetched length.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, FieldError};
use crate::exec::Client;
use crate::query::build::SelectQuery;
use crate::query::render::SqlRenderer;
use crate::value::Row;

/// Alias of the count column when the total rides along on the page query.
pub const COUNT_ALIAS: &str = "__total_count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountMode {
    /// Count the rows actually fetched. No extra SQL.
    #[default]
    Lazy,
    /// One extra COUNT round trip over the filtered, pre-limit query.
    EagerSeparate,
    /// Appended scalar count column on the page query itself.
    EagerAppended,
}

/// Pagination metadata returned alongside a page of rows. Fields irrelevant
/// to the active strategy stay `None` and are skipped on serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum Paginator {
    LimitOffset(LimitOffsetPagination),
    PageNumber(PageNumberPagination),
}

impl Paginator {
    /// Query-parameter names this strategy consumes. The filter schema treats
    /// these as allowed extras when rejecting unknown parameters.
    pub fn param_keys(&self) -> &'static [&'static str] {
        match self {
            Paginator::LimitOffset(_) => &["limit", "offset"],
            Paginator::PageNumber(pagination) => {
                if pagination.max_page_size.is_some() {
                    &["page", "page_size"]
                } else {
                    &["page"]
                }
            }
        }
    }

    pub async fn fetch_page(
        &self,
        client: &mut dyn Client,
        query: SelectQuery,
        params: &BTreeMap<String, String>,
    ) -> Result<(Vec<Row>, PageMeta), EngineError> {
        match self {
            Paginator::LimitOffset(pagination) => pagination.fetch_page(client, query, params).await,
            Paginator::PageNumber(pagination) => pagination.fetch_page(client, query, params).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LimitOffsetPagination {
    default_limit: Option<u64>,
    max_limit: Option<u64>,
    count_mode: CountMode,
}

impl LimitOffsetPagination {
    pub fn new(default_limit: Option<u64>, max_limit: Option<u64>) -> Self {
        Self {
            default_limit,
            max_limit,
            count_mode: CountMode::default(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.default_limit, config.max_limit)
    }

    pub fn with_count_mode(mut self, count_mode: CountMode) -> Self {
        self.count_mode = count_mode;
        self
    }

    fn parse(&self, params: &BTreeMap<String, String>) -> Result<(Option<u64>, u64), EngineError> {
        let mut errors = Vec::new();
        let limit = match params.get("limit") {
            Some(raw) => parse_bounded(raw, "limit", 0, &mut errors),
            None => self.default_limit,
        };
        let offset = params
            .get("offset")
            .and_then(|raw| parse_bounded(raw, "offset", 0, &mut errors))
            .unwrap_or(0);
        if !errors.is_empty() {
            return Err(EngineError::validation(errors));
        }
        let limit = match (limit, self.max_limit) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (limit, _) => limit,
        };
        Ok((limit, offset))
    }

    pub async fn fetch_page(
        &self,
        client: &mut dyn Client,
        query: SelectQuery,
        params: &BTreeMap<String, String>,
    ) -> Result<(Vec<Row>, PageMeta), EngineError> {
        let (limit, offset) = self.parse(params)?;
        // limit 0 means "no limiting", offset applies either way
        let effective_limit = limit.filter(|l| *l > 0);
        let effective_offset = Some(offset).filter(|o| *o > 0);
        let limiting = effective_limit.is_some();
        debug!(?limit, offset, limiting, "limit/offset page");

        let (rows, count) = execute_paged(
            client,
            query,
            effective_limit,
            effective_offset,
            self.count_mode,
            limiting,
        )
        .await?;
        let meta = PageMeta {
            count,
            limit,
            offset: Some(offset),
            ..PageMeta::default()
        };
        Ok((rows, meta))
    }
}

#[derive(Debug, Clone)]
pub struct PageNumberPagination {
    page_size: u64,
    max_page_size: Option<u64>,
    count_mode: CountMode,
}

impl PageNumberPagination {
    pub fn new(page_size: u64, max_page_size: Option<u64>) -> Self {
        Self {
            page_size,
            max_page_size,
            count_mode: CountMode::default(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.default_page_size, config.max_page_size)
    }

    pub fn with_count_mode(mut self, count_mode: CountMode) -> Self {
        self.count_mode = count_mode;
        self
    }

    fn parse(&self, params: &BTreeMap<String, String>) -> Result<(Option<u64>, u64), EngineError> {
        let mut errors = Vec::new();
        let page = params
            .get("page")
            .and_then(|raw| parse_bounded(raw, "page", 1, &mut errors));
        // page_size is only a parameter when a cap is configured; zero falls
        // back to the configured size
        let mut page_size = if self.max_page_size.is_some() {
            params
                .get("page_size")
                .and_then(|raw| parse_bounded(raw, "page_size", 0, &mut errors))
                .filter(|size| *size > 0)
                .unwrap_or(self.page_size)
        } else {
            self.page_size
        };
        if !errors.is_empty() {
            return Err(EngineError::validation(errors));
        }
        if page.is_some()
            && let Some(max) = self.max_page_size
        {
            page_size = page_size.min(max);
        }
        Ok((page, page_size))
    }

    pub async fn fetch_page(
        &self,
        client: &mut dyn Client,
        query: SelectQuery,
        params: &BTreeMap<String, String>,
    ) -> Result<(Vec<Row>, PageMeta), EngineError> {
        let (page, page_size) = self.parse(params)?;
        let Some(page) = page else {
            // no page parameter: the full set, unpaginated
            let (rows, count) =
                execute_paged(client, query, None, None, self.count_mode, false).await?;
            return Ok((rows, PageMeta { count, ..PageMeta::default() }));
        };

        let offset = (page - 1) * page_size;
        debug!(page, page_size, offset, "page-number page");
        let (rows, count) = execute_paged(
            client,
            query,
            Some(page_size),
            Some(offset).filter(|o| *o > 0),
            self.count_mode,
            true,
        )
        .await?;
        let meta = PageMeta {
            count,
            page: Some(page),
            page_size: Some(page_size),
            ..PageMeta::default()
        };
        Ok((rows, meta))
    }
}

fn parse_bounded(
    raw: &str,
    field: &str,
    min: i64,
    errors: &mut Vec<FieldError>,
) -> Option<u64> {
    match raw.parse::<i64>() {
        Ok(value) if value >= min => Some(value as u64),
        Ok(_) => {
            errors.push(FieldError::new(
                field,
                format!("must be greater than or equal to {min}"),
            ));
            None
        }
        Err(_) => {
            errors.push(FieldError::new(field, "not a valid integer"));
            None
        }
    }
}

async fn execute_paged(
    client: &mut dyn Client,
    query: SelectQuery,
    limit: Option<u64>,
    offset: Option<u64>,
    count_mode: CountMode,
    limiting: bool,
) -> Result<(Vec<Row>, u64), EngineError> {
    let renderer = SqlRenderer::new(client.dialect());

    let mut eager_count = None;
    if limiting && count_mode == CountMode::EagerSeparate {
        let statement = renderer.count_over(&query);
        let rows = client.fetch_all(&statement).await?;
        eager_count = Some(scalar_count(&rows));
    }

    let mut page_query = query;
    if limiting && count_mode == CountMode::EagerAppended {
        page_query = page_query.with_count_alias(COUNT_ALIAS);
    }
    if let Some(limit) = limit {
        page_query = page_query.limit(limit);
    }
    if let Some(offset) = offset {
        page_query = page_query.offset(offset);
    }

    let statement = renderer.select(&page_query);
    let mut rows = client.fetch_all(&statement).await?;

    let count = if !limiting {
        rows.len() as u64
    } else {
        match count_mode {
            CountMode::Lazy => rows.len() as u64,
            CountMode::EagerSeparate => eager_count.unwrap_or(0),
            CountMode::EagerAppended => strip_appended_count(&mut rows),
        }
    };
    Ok((rows, count))
}

fn scalar_count(rows: &[Row]) -> u64 {
    rows.first()
        .and_then(|row| row.values.first())
        .and_then(|value| value.as_integer())
        .map_or(0, |count| count.max(0) as u64)
}

/// Reads the appended count from the first row and removes the column from
/// every row so it never leaks into response payloads.
fn strip_appended_count(rows: &mut [Row]) -> u64 {
    let mut count = 0;
    for (idx, row) in rows.iter_mut().enumerate() {
        let taken = row.take(COUNT_ALIAS);
        if idx == 0
            && let Some(total) = taken.and_then(|value| value.as_integer())
        {
            count = total.max(0) as u64;
        }
    }
    count
}
