//! Minimal SELECT statement assembly for the rule executors

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(format!("Invalid sort order '{}', use ASC or DESC", s)),
        }
    }
}

/// A SELECT over one aliased base table
///
/// Predicates are ANDed. Extra joins and columns can be attached by a caller
/// after the rule predicate is in place.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    columns: Vec<String>,
    from: String,
    joins: Vec<String>,
    predicates: Vec<String>,
    order_by: Vec<String>,
    limit: Option<i64>,
    offset: i64,
}

impl SelectQuery {
    /// `SELECT alias.* FROM table AS alias`
    pub fn from_table(table: &str, alias: &str) -> Self {
        Self {
            columns: vec![format!("{}.*", alias)],
            from: format!("{} AS {}", table, alias),
            joins: Vec::new(),
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Replace the selected column list
    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn add_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.columns.push(column.into());
        self
    }

    /// Append a full join clause, e.g. `LEFT JOIN x ON ...`
    pub fn join(&mut self, clause: impl Into<String>) -> &mut Self {
        self.joins.push(clause.into());
        self
    }

    pub fn and_where(&mut self, predicate: impl Into<String>) -> &mut Self {
        self.predicates.push(predicate.into());
        self
    }

    pub fn order_by(&mut self, expr: &str, order: SortOrder) -> &mut Self {
        self.order_by.push(format!("{} {}", expr, order.as_sql()));
        self
    }

    /// `None` means no LIMIT clause
    pub fn limit(&mut self, limit: Option<i64>) -> &mut Self {
        self.limit = limit;
        self
    }

    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.offset = offset;
        self
    }

    fn from_and_where(&self) -> String {
        let mut sql = format!("FROM {}", self.from);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicates.join(" AND "));
        }
        sql
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT {} {}", self.columns.join(", "), self.from_and_where());
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if self.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", self.offset));
        }
        sql
    }

    /// Total row count ignoring order, limit and offset
    pub fn to_count_sql(&self) -> String {
        format!("SELECT COUNT(*) {}", self.from_and_where())
    }
}
