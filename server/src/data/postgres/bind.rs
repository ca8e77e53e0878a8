//! Named to positional placeholder binding
//!
//! The rule compiler emits `:name` placeholders. PostgreSQL wants `$n`, so the
//! final statement text is rewritten here and the values are collected in
//! positional order. A name used twice maps to the same `$n`.

use std::collections::HashMap;

use sqlx::Arguments;
use sqlx::postgres::PgArguments;

use crate::data::query::{ParamBag, ParamValue, QueryError};
use crate::utils::sql::rewrite_placeholders;

/// Ordered bind values for one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindList {
    values: Vec<ParamValue>,
    positions: HashMap<String, usize>,
}

impl BindList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an anonymous value, returning its `$n` placeholder
    pub fn push(&mut self, value: ParamValue) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    /// Rewrite `:name` placeholders in `sql` to `$n`, binding from `params`
    ///
    /// A referenced name missing from `params` means the compiler and the
    /// statement disagree, which is reported as an internal error.
    pub fn bind_named(&mut self, sql: &str, params: &ParamBag) -> Result<String, QueryError> {
        rewrite_placeholders(sql, |name| {
            if let Some(position) = self.positions.get(name) {
                return Ok(format!("${}", position));
            }
            let value = params.get(name).cloned().ok_or_else(|| {
                tracing::error!(param = name, "Placeholder has no bound value");
                QueryError::Internal(format!("Unbound query parameter ':{}'", name))
            })?;
            let placeholder = self.push(value);
            self.positions.insert(name.to_string(), self.values.len());
            Ok(placeholder)
        })
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Encode the values as sqlx arguments
    pub fn to_arguments(&self) -> Result<PgArguments, QueryError> {
        let mut args = PgArguments::default();
        for value in &self.values {
            let added = match value {
                ParamValue::Null => args.add(None::<String>),
                ParamValue::Text(s) => args.add(s.clone()),
                ParamValue::Number(n) => args.add(*n),
                ParamValue::Bool(b) => args.add(*b),
                ParamValue::Timestamp(t) => args.add(*t),
                ParamValue::TextList(list) => args.add(list.clone()),
            };
            added.map_err(|e| QueryError::Internal(format!("Failed to encode parameter: {}", e)))?;
        }
        Ok(args)
    }
}
