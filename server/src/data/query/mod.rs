//! Rule query engine
//!
//! Client-supplied rule trees are validated against an entity's [`Filters`],
//! compiled into one parameterized predicate and handed to the PostgreSQL
//! executors in [`crate::data::postgres`].
//!
//! - `types` - Wire and validated tree types, parameter values
//! - `operators` - Operator vocabulary and SQL templates per field type
//! - `values` - Value preparation (dates, identity, NULL handling)
//! - `handlers` - Field handler registry for virtual fields
//! - `validate` - Schema validation and JSON intake limits
//! - `compile` - Tree to predicate compiler

pub mod compile;
pub mod error;
pub mod handlers;
pub mod operators;
pub mod types;
pub mod validate;
pub mod values;

pub use compile::{CompileOptions, CompiledPredicate, compile};
pub use error::QueryError;
pub use handlers::{FieldHandler, FieldHandlerArgs, FieldHandlers, HandlerSql};
pub use operators::Operator;
pub use types::{
    ActingIdentity, FieldDescriptor, FilterType, Filters, GroupCondition, ParamBag, ParamValue,
    Rule, RuleGroup, RuleNode, RuleValue, ValidatedRuleGroup,
};
pub use validate::{parse_rule_group, parse_rules_json, validate};
