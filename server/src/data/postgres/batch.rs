//! Rule-targeted batch updates
//!
//! One `UPDATE ... WHERE <predicate>` statement per call. The rule tree is
//! mandatory so an update can never silently hit the whole table; pass an
//! explicit empty AND group to mean "every row".

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::data::entities::EntityDef;
use crate::data::query::{
    ActingIdentity, CompileOptions, FieldHandlers, ParamValue, QueryError, RuleGroup, compile,
    validate,
};

use super::bind::BindList;

/// Ordered `column = value` assignments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSet {
    assignments: Vec<(String, ParamValue)>,
}

impl UpdateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: &str, value: impl Into<ParamValue>) -> Self {
        self.assignments.push((column.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions<'a> {
    pub identity: Option<&'a ActingIdentity>,
    /// Replaces the entity's own handlers when set
    pub handlers: Option<&'a FieldHandlers>,
    pub now: Option<DateTime<Utc>>,
}

/// Rendered UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    pub sql: String,
    pub binds: BindList,
    pub primary_key: &'static str,
}

/// Validate, compile and render a batch update without running it
///
/// Update values bind first (`$1..$k`), predicate values follow. Each update
/// value is cast to its column's declared type.
pub fn plan_batch_update(
    entity: &EntityDef,
    rules: &RuleGroup,
    update: &UpdateSet,
    returning: bool,
    options: &BatchOptions<'_>,
) -> Result<BatchPlan, QueryError> {
    let primary_key = entity.single_primary_key()?;

    if update.is_empty() {
        return Err(QueryError::usage(
            "EMPTY_UPDATE",
            "Batch update needs at least one column to set",
        ));
    }

    let validated = validate(&entity.filters, rules)?;
    let prefix = entity.field_prefix();
    let compile_options = CompileOptions::new(&prefix)
        .with_handlers(options.handlers.unwrap_or(&entity.handlers))
        .with_identity(options.identity)
        .at(options.now.unwrap_or_else(Utc::now));
    let compiled = compile(&validated, &compile_options)?;

    let mut binds = BindList::new();
    let mut assignments = Vec::with_capacity(update.len());
    for (column, value) in &update.assignments {
        let column_type = entity.column_type(column).ok_or_else(|| {
            QueryError::usage(
                "INVALID_UPDATE_COLUMN",
                format!("Cannot update column: {}", column),
            )
        })?;
        let placeholder = binds.push(value.clone());
        assignments.push(format!("{} = {}", column, column_type.cast(&placeholder)));
    }
    let predicate = binds.bind_named(&compiled.sql, &compiled.params)?;

    let mut sql = format!(
        "UPDATE {} AS {} SET {} WHERE {}",
        entity.table,
        entity.alias,
        assignments.join(", "),
        predicate
    );
    if returning {
        sql.push_str(&format!(" RETURNING {}.{}", entity.alias, primary_key));
    }

    Ok(BatchPlan {
        sql,
        binds,
        primary_key,
    })
}

/// Apply `update` to every row matching `rules`, returning the affected count
pub async fn batch_update(
    pool: &PgPool,
    entity: &EntityDef,
    rules: &RuleGroup,
    update: &UpdateSet,
    options: &BatchOptions<'_>,
) -> Result<u64, QueryError> {
    let plan = plan_batch_update(entity, rules, update, false, options)?;
    tracing::trace!(sql = %plan.sql, "Batch update plan");

    let result = sqlx::query_with(&plan.sql, plan.binds.to_arguments()?)
        .execute(pool)
        .await?;
    let affected = result.rows_affected();

    tracing::debug!(entity = entity.name, affected, "Batch update applied");
    Ok(affected)
}

/// Like [`batch_update`] but returns the primary keys of the updated rows
pub async fn batch_update_returning<I>(
    pool: &PgPool,
    entity: &EntityDef,
    rules: &RuleGroup,
    update: &UpdateSet,
    options: &BatchOptions<'_>,
) -> Result<Vec<I>, QueryError>
where
    I: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + Send + Unpin,
{
    let plan = plan_batch_update(entity, rules, update, true, options)?;
    tracing::trace!(sql = %plan.sql, "Batch update plan");

    let ids: Vec<I> = sqlx::query_scalar_with(&plan.sql, plan.binds.to_arguments()?)
        .fetch_all(pool)
        .await?;

    tracing::debug!(entity = entity.name, affected = ids.len(), "Batch update applied");
    Ok(ids)
}
