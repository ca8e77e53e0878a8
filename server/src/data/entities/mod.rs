//! Entity catalog
//!
//! One [`EntityDef`] per listable table: where it lives, which fields a rule
//! may reference, how virtual fields are resolved and what may be sorted on.

mod api_keys;
mod callouts;
mod contacts;
mod payments;
mod responses;
mod roles;

use std::sync::LazyLock;

use crate::data::postgres::select::SelectQuery;
use crate::data::query::{FieldHandlers, Filters, QueryError};

/// PostgreSQL type of a writable column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Numeric,
    Boolean,
    Timestamp,
    Jsonb,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamptz",
            Self::Jsonb => "jsonb",
        }
    }

    /// Convert a bound placeholder to this column's type
    ///
    /// Bind values carry their own type (text, float8, text[]), and PostgreSQL
    /// does not assign those to other column types implicitly.
    pub fn cast(&self, placeholder: &str) -> String {
        match self {
            Self::Jsonb => format!("to_jsonb({})", placeholder),
            other => format!("CAST({} AS {})", placeholder, other.as_sql()),
        }
    }
}

/// Static description of a rule-queryable table
#[derive(Debug)]
pub struct EntityDef {
    /// Name used by the CLI and in logs
    pub name: &'static str,
    pub table: &'static str,
    pub alias: &'static str,
    pub primary_key: &'static [&'static str],
    /// API field names allowed in `sort`
    pub sortable: &'static [&'static str],
    /// Columns a batch update may set
    pub columns: &'static [(&'static str, ColumnType)],
    pub filters: Filters,
    pub handlers: FieldHandlers,
}

impl EntityDef {
    /// Column prefix for this entity's alias, e.g. `"item."`
    pub fn field_prefix(&self) -> String {
        format!("{}.", self.alias)
    }

    pub fn base_query(&self) -> SelectQuery {
        SelectQuery::from_table(self.table, self.alias)
    }

    /// The primary key column, if the key is not composite
    pub fn single_primary_key(&self) -> Result<&'static str, QueryError> {
        match self.primary_key {
            [column] => Ok(*column),
            columns => Err(QueryError::Unsupported(format!(
                "Batch update on '{}' needs a single primary key, found [{}]",
                self.name,
                columns.join(", ")
            ))),
        }
    }

    /// Fails for entities that can never be batch updated
    pub fn check_batch_updatable(&self) -> Result<(), QueryError> {
        self.single_primary_key().map(|_| ())
    }

    /// Type of a writable column
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, column_type)| *column_type)
    }

    /// Qualified column for an allow-listed sort field
    pub fn sort_column(&self, sort: &str) -> Result<String, QueryError> {
        if !self.sortable.iter().any(|field| *field == sort) {
            return Err(QueryError::InvalidSort(sort.to_string()));
        }
        let column = self.filters.column_of(sort).unwrap_or(sort);
        Ok(format!("{}.{}", self.alias, column))
    }
}

pub static CONTACTS: LazyLock<EntityDef> = LazyLock::new(contacts::definition);
pub static CALLOUTS: LazyLock<EntityDef> = LazyLock::new(callouts::definition);
pub static RESPONSES: LazyLock<EntityDef> = LazyLock::new(responses::definition);
pub static PAYMENTS: LazyLock<EntityDef> = LazyLock::new(payments::definition);
pub static API_KEYS: LazyLock<EntityDef> = LazyLock::new(api_keys::definition);
pub static CONTACT_ROLES: LazyLock<EntityDef> = LazyLock::new(roles::definition);

/// Every registered entity
pub fn all() -> [&'static EntityDef; 6] {
    [
        &CONTACTS,
        &CALLOUTS,
        &RESPONSES,
        &PAYMENTS,
        &API_KEYS,
        &CONTACT_ROLES,
    ]
}

pub fn by_name(name: &str) -> Option<&'static EntityDef> {
    all().into_iter().find(|entity| entity.name == name)
}

/// Names of every registered entity
pub fn names() -> Vec<&'static str> {
    all().iter().map(|entity| entity.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(by_name("contacts").map(|e| e.table), Some("contacts"));
        assert_eq!(
            by_name("responses").map(|e| e.table),
            Some("callout_responses")
        );
        assert!(by_name("users").is_none());
        assert_eq!(names().len(), 6);
    }

    #[test]
    fn test_sort_column_allow_list() {
        assert_eq!(CONTACTS.sort_column("lastname").unwrap(), "item.lastname");
        assert_eq!(CONTACTS.sort_column("lastSeen").unwrap(), "item.last_seen");
        assert!(matches!(
            CONTACTS.sort_column("password"),
            Err(QueryError::InvalidSort(_))
        ));
    }

    #[test]
    fn test_sortable_fields_are_declared() {
        for entity in all() {
            for field in entity.sortable {
                assert!(
                    entity.filters.contains(field),
                    "{} sorts on undeclared field {}",
                    entity.name,
                    field
                );
            }
        }
    }

    #[test]
    fn test_column_casts() {
        assert_eq!(
            RESPONSES.column_type("updated_at"),
            Some(ColumnType::Timestamp)
        );
        assert_eq!(RESPONSES.column_type("id"), None);
        assert_eq!(ColumnType::Timestamp.cast("$1"), "CAST($1 AS timestamptz)");
        assert_eq!(ColumnType::Jsonb.cast("$2"), "to_jsonb($2)");
    }

    #[test]
    fn test_writable_columns_are_unique_identifiers() {
        for entity in all() {
            for (i, (name, _)) in entity.columns.iter().enumerate() {
                assert!(crate::utils::sql::is_identifier(name), "{}", name);
                assert!(
                    !entity.columns[..i].iter().any(|(other, _)| other == name),
                    "{} lists {} twice",
                    entity.name,
                    name
                );
                assert!(
                    !entity.primary_key.contains(name),
                    "{} allows writing its key {}",
                    entity.name,
                    name
                );
            }
        }
    }

    #[test]
    fn test_composite_key_is_not_batch_updatable() {
        assert!(CONTACTS.check_batch_updatable().is_ok());
        assert!(PAYMENTS.check_batch_updatable().is_ok());
        assert!(matches!(
            CONTACT_ROLES.check_batch_updatable(),
            Err(QueryError::Unsupported(_))
        ));
    }
}
