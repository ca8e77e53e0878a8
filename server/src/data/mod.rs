//! Data layer
//!
//! - `query` - rule trees: validation and compilation to SQL predicates
//! - `entities` - the catalog of rule-queryable tables
//! - `postgres` - pool, paginated fetch and batch update against PostgreSQL

pub mod entities;
pub mod postgres;
pub mod query;

pub use postgres::{PostgresError, PostgresService};
pub use query::QueryError;
