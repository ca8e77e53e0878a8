//! Field handlers
//!
//! A field handler replaces the default `alias.column <op> :value` comparison
//! for one field (or a family of fields sharing a prefix) so virtual fields can
//! be expressed as joins or subqueries in the same rule language.
//!
//! Lookup is an explicit two-level table: exact field name first, then the part
//! before the first [`FIELD_SEPARATOR`], then [`DefaultHandler`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::utils::sql::suffix_placeholders;

use super::error::QueryError;
use super::operators::{Operator, Template};
use super::types::{ActingIdentity, FilterType, ParamValue, ValidatedRule};
use super::values::FieldTransform;

/// Separator between a handler prefix and the rest of a field name
pub const FIELD_SEPARATOR: char = '.';

/// Everything a handler needs to build the predicate for one rule
pub struct FieldHandlerArgs<'a> {
    /// Table alias plus separator, e.g. `"item."`
    pub field_prefix: &'a str,
    pub field: &'a str,
    pub column: &'a str,
    pub filter_type: FilterType,
    pub operator: Operator,
    /// Prepared values, also bound as `valueA` / `valueB`
    pub values: &'a [ParamValue],
    pub rule: &'a ValidatedRule,
    pub identity: Option<&'a ActingIdentity>,
    pub(crate) rule_index: usize,
    pub(crate) template: Template,
    pub(crate) transform: FieldTransform,
}

impl FieldHandlerArgs<'_> {
    /// Default comparison against an arbitrary field expression
    ///
    /// Applies the value transform, then the operator template, then suffixes
    /// the placeholders for this rule.
    pub fn where_sql(&self, field_expr: &str) -> String {
        let sql = self.template.apply(&self.transform.apply(field_expr));
        suffix_placeholders(&sql, self.rule_index)
    }

    /// Suffix every `:param` in handler-written SQL for this rule
    pub fn suffix(&self, sql: &str) -> String {
        suffix_placeholders(sql, self.rule_index)
    }

    /// `alias.column` for this field
    pub fn default_column(&self) -> String {
        self.qualified(self.column)
    }

    /// Any column of the base table, qualified with its alias
    pub fn qualified(&self, column: &str) -> String {
        format!("{}{}", self.field_prefix, column)
    }

    /// Part of the field name after the prefix separator, if any
    pub fn subfield(&self) -> Option<&str> {
        self.field
            .split_once(FIELD_SEPARATOR)
            .map(|(_, rest)| rest)
    }

    pub fn require_admin(&self) -> Result<(), QueryError> {
        match self.identity {
            Some(identity) if identity.admin => Ok(()),
            _ => Err(QueryError::Forbidden(format!(
                "Field '{}' can only be used by admins",
                self.field
            ))),
        }
    }

    pub fn unsupported_operator(&self) -> QueryError {
        QueryError::usage(
            "UNSUPPORTED_OPERATOR",
            format!(
                "Operator '{}' is not supported for field '{}'",
                self.operator, self.field
            ),
        )
    }
}

/// Handler output: a self-contained predicate plus extra named parameters
///
/// Parameter names are given bare; the compiler appends the rule suffix, so
/// the SQL must reference them through [`FieldHandlerArgs::suffix`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerSql {
    pub sql: String,
    pub params: Vec<(String, ParamValue)>,
}

impl HandlerSql {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: ParamValue) -> Self {
        self.params.push((name.to_string(), value));
        self
    }
}

impl From<String> for HandlerSql {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

pub trait FieldHandler: Send + Sync {
    fn build(&self, args: &FieldHandlerArgs<'_>) -> Result<HandlerSql, QueryError>;
}

impl<F> FieldHandler for F
where
    F: Fn(&FieldHandlerArgs<'_>) -> Result<HandlerSql, QueryError> + Send + Sync,
{
    fn build(&self, args: &FieldHandlerArgs<'_>) -> Result<HandlerSql, QueryError> {
        self(args)
    }
}

/// Compares `alias.column` directly
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

impl FieldHandler for DefaultHandler {
    fn build(&self, args: &FieldHandlerArgs<'_>) -> Result<HandlerSql, QueryError> {
        Ok(HandlerSql::new(args.where_sql(&args.default_column())))
    }
}

/// Per-entity handler registry
#[derive(Clone, Default)]
pub struct FieldHandlers {
    exact: HashMap<String, Arc<dyn FieldHandler>>,
    prefixed: HashMap<String, Arc<dyn FieldHandler>>,
}

impl FieldHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one exact field name
    pub fn with(mut self, field: &str, handler: impl FieldHandler + 'static) -> Self {
        self.exact.insert(field.to_string(), Arc::new(handler));
        self
    }

    /// Register a catch-all for every `prefix.<anything>` field
    pub fn with_prefix(mut self, prefix: &str, handler: impl FieldHandler + 'static) -> Self {
        self.prefixed.insert(prefix.to_string(), Arc::new(handler));
        self
    }

    /// Registered handler for a field, `None` meaning the default applies
    pub fn lookup(&self, field: &str) -> Option<&dyn FieldHandler> {
        if let Some(handler) = self.exact.get(field) {
            return Some(handler.as_ref());
        }
        let (prefix, _) = field.split_once(FIELD_SEPARATOR)?;
        self.prefixed.get(prefix).map(|h| h.as_ref())
    }

    /// Handler for a field, falling back to [`DefaultHandler`]
    pub fn resolve(&self, field: &str) -> &dyn FieldHandler {
        self.lookup(field).unwrap_or(&DefaultHandler)
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefixed.is_empty()
    }
}

impl fmt::Debug for FieldHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut exact: Vec<_> = self.exact.keys().collect();
        exact.sort();
        let mut prefixed: Vec<_> = self.prefixed.keys().collect();
        prefixed.sort();
        f.debug_struct("FieldHandlers")
            .field("exact", &exact)
            .field("prefixed", &prefixed)
            .finish()
    }
}
