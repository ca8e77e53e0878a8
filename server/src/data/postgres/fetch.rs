//! Paginated rule-filtered fetch
//!
//! Planning is pure: [`plan_fetch`] validates and compiles the rules, picks the
//! sort and page, and renders both the count and page statements with their
//! positional binds. [`fetch_paginated`] runs the plan.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgRow;

use crate::core::constants::{QUERY_DEFAULT_LIMIT, QUERY_MAX_LIMIT};
use crate::data::entities::EntityDef;
use crate::data::query::{
    ActingIdentity, CompileOptions, FieldHandlers, QueryError, RuleGroup, compile, validate,
};

use super::bind::BindList;
use super::select::{SelectQuery, SortOrder};

/// `limit` value that disables paging (exports)
pub const UNLIMITED: i64 = -1;

/// Raw list request: rules plus paging
#[derive(Debug, Clone, Default)]
pub struct FetchQuery {
    pub rules: Option<RuleGroup>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: QUERY_DEFAULT_LIMIT,
            max_limit: QUERY_MAX_LIMIT,
        }
    }
}

/// Hook run on the assembled query before it is rendered
pub type QueryHook<'a> = &'a (dyn Fn(&mut SelectQuery) + Send + Sync);

/// Per-call execution context
#[derive(Clone)]
pub struct FetchOptions<'a> {
    pub identity: Option<&'a ActingIdentity>,
    /// Replaces the entity's own handlers when set
    pub handlers: Option<&'a FieldHandlers>,
    /// Joins or columns needed regardless of the rules
    pub with: Option<QueryHook<'a>>,
    pub limits: PageLimits,
    pub now: DateTime<Utc>,
}

impl Default for FetchOptions<'_> {
    fn default() -> Self {
        Self {
            identity: None,
            handlers: None,
            with: None,
            limits: PageLimits::default(),
            now: Utc::now(),
        }
    }
}

impl<'a> FetchOptions<'a> {
    pub fn with_identity(mut self, identity: Option<&'a ActingIdentity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_handlers(mut self, handlers: &'a FieldHandlers) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn with_query_hook(mut self, hook: QueryHook<'a>) -> Self {
        self.with = Some(hook);
        self
    }

    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Rendered statements for one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPlan {
    pub count_sql: String,
    pub fetch_sql: String,
    pub binds: BindList,
    /// `None` when unlimited
    pub limit: Option<i64>,
    pub offset: i64,
    pub rule_count: usize,
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub offset: i64,
    pub count: usize,
}

impl<T> Paginated<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
            count: self.count,
        }
    }
}

fn resolve_page(
    query: &FetchQuery,
    limits: PageLimits,
) -> Result<(Option<i64>, i64), QueryError> {
    let limit = match query.limit.unwrap_or(limits.default_limit) {
        UNLIMITED => None,
        n if (1..=limits.max_limit).contains(&n) => Some(n),
        n => {
            return Err(QueryError::InvalidPagination(format!(
                "limit must be between 1 and {} (or {} for no limit), got {}",
                limits.max_limit, UNLIMITED, n
            )));
        }
    };
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(QueryError::InvalidPagination(format!(
            "offset must be >= 0, got {}",
            offset
        )));
    }
    Ok((limit, offset))
}

/// Validate, compile and render a fetch without touching the database
pub fn plan_fetch(
    entity: &EntityDef,
    query: &FetchQuery,
    options: &FetchOptions<'_>,
) -> Result<FetchPlan, QueryError> {
    let (limit, offset) = resolve_page(query, options.limits)?;
    let sort = query
        .sort
        .as_deref()
        .map(|sort| entity.sort_column(sort))
        .transpose()?;

    let mut select = entity.base_query();
    let mut binds = BindList::new();
    let mut rule_count = 0;

    if let Some(rules) = &query.rules {
        let validated = validate(&entity.filters, rules)?;
        let prefix = entity.field_prefix();
        let compile_options = CompileOptions::new(&prefix)
            .with_handlers(options.handlers.unwrap_or(&entity.handlers))
            .with_identity(options.identity)
            .at(options.now);
        let compiled = compile(&validated, &compile_options)?;
        rule_count = compiled.rule_count;
        select.and_where(binds.bind_named(&compiled.sql, &compiled.params)?);
    }

    if let Some(column) = &sort {
        select.order_by(column, query.order.unwrap_or_default());
    }
    for key in entity.primary_key {
        select.order_by(&format!("{}.{}", entity.alias, key), SortOrder::Asc);
    }
    select.limit(limit).offset(offset);

    if let Some(hook) = options.with {
        hook(&mut select);
    }

    Ok(FetchPlan {
        count_sql: select.to_count_sql(),
        fetch_sql: select.to_sql(),
        binds,
        limit,
        offset,
        rule_count,
    })
}

/// Run a rule-filtered, sorted, paginated fetch
pub async fn fetch_paginated<T>(
    pool: &PgPool,
    entity: &EntityDef,
    query: &FetchQuery,
    options: &FetchOptions<'_>,
) -> Result<Paginated<T>, QueryError>
where
    T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
{
    let plan = plan_fetch(entity, query, options)?;
    tracing::trace!(count_sql = %plan.count_sql, fetch_sql = %plan.fetch_sql, "Fetch plan");

    let total: i64 = sqlx::query_scalar_with(&plan.count_sql, plan.binds.to_arguments()?)
        .fetch_one(pool)
        .await?;
    let items: Vec<T> = sqlx::query_as_with(&plan.fetch_sql, plan.binds.to_arguments()?)
        .fetch_all(pool)
        .await?;

    tracing::debug!(
        entity = entity.name,
        rules = plan.rule_count,
        limit = ?plan.limit,
        offset = plan.offset,
        total,
        count = items.len(),
        "Fetched page"
    );

    Ok(Paginated {
        count: items.len(),
        items,
        total,
        offset: plan.offset,
    })
}
