//! Rule tree compiler
//!
//! Walks a validated tree once and produces a single boolean SQL predicate
//! with named `:valueA_N` style placeholders, plus the bag of values they refer to.
//! The rule counter and the bag live in one [`RuleCompiler`] per call, so two
//! compiles never share parameter state.

use chrono::{DateTime, Utc};

use super::error::QueryError;
use super::handlers::{DefaultHandler, FieldHandler, FieldHandlerArgs, FieldHandlers};
use super::operators::operator_template;
use super::types::{
    ActingIdentity, GroupCondition, ParamBag, ParamValue, ValidatedNode, ValidatedRule,
    ValidatedRuleGroup,
};
use super::values::prepare_rule;

/// Name of the compile-time timestamp parameter
pub const NOW_PARAM: &str = "now";

/// Per-rule parameter names a handler may not reuse
const RESERVED_PARAMS: [&str; 3] = ["valueA", "valueB", NOW_PARAM];

/// Inputs to one compile call besides the tree itself
#[derive(Debug, Clone)]
pub struct CompileOptions<'a> {
    /// Table alias plus separator, e.g. `"item."`
    pub field_prefix: &'a str,
    pub handlers: Option<&'a FieldHandlers>,
    pub identity: Option<&'a ActingIdentity>,
    /// Reference time for relative dates and `:now`
    pub now: DateTime<Utc>,
}

impl<'a> CompileOptions<'a> {
    pub fn new(field_prefix: &'a str) -> Self {
        Self {
            field_prefix,
            handlers: None,
            identity: None,
            now: Utc::now(),
        }
    }

    pub fn with_handlers(mut self, handlers: &'a FieldHandlers) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn with_identity(mut self, identity: Option<&'a ActingIdentity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// A compiled predicate ready to be attached to a WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    pub sql: String,
    pub params: ParamBag,
    /// Number of leaf rules compiled
    pub rule_count: usize,
}

/// Compile a validated rule tree into a predicate and its parameters
pub fn compile(
    group: &ValidatedRuleGroup,
    options: &CompileOptions<'_>,
) -> Result<CompiledPredicate, QueryError> {
    let mut compiler = RuleCompiler::new(options);
    let sql = compiler.group(group)?;

    tracing::trace!(
        sql = %sql,
        rules = compiler.counter,
        params = compiler.params.len(),
        "Compiled rule predicate"
    );

    Ok(CompiledPredicate {
        sql,
        params: compiler.params,
        rule_count: compiler.counter,
    })
}

struct RuleCompiler<'o, 'a> {
    options: &'o CompileOptions<'a>,
    counter: usize,
    params: ParamBag,
}

impl<'o, 'a> RuleCompiler<'o, 'a> {
    fn new(options: &'o CompileOptions<'a>) -> Self {
        let mut params = ParamBag::default();
        params.insert(NOW_PARAM, ParamValue::Timestamp(options.now));
        Self {
            options,
            counter: 0,
            params,
        }
    }

    fn group(&mut self, group: &ValidatedRuleGroup) -> Result<String, QueryError> {
        if group.rules.is_empty() {
            return Ok(match group.condition {
                GroupCondition::And => "TRUE",
                GroupCondition::Or => "FALSE",
            }
            .to_string());
        }

        let parts = group
            .rules
            .iter()
            .map(|node| match node {
                ValidatedNode::Group(inner) => self.group(inner),
                ValidatedNode::Rule(rule) => self.rule(rule),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let joiner = format!(" {} ", group.condition.as_sql());
        Ok(format!("({})", parts.join(&joiner)))
    }

    fn rule(&mut self, rule: &ValidatedRule) -> Result<String, QueryError> {
        let template = operator_template(rule.filter_type, rule.operator).ok_or_else(|| {
            tracing::error!(
                field = %rule.field,
                filter_type = %rule.filter_type,
                operator = %rule.operator,
                "Validated rule has no operator template"
            );
            QueryError::Internal(format!(
                "No template for operator '{}' on {} field '{}'",
                rule.operator, rule.filter_type, rule.field
            ))
        })?;
        let prepared = prepare_rule(rule, self.options.identity, self.options.now)?;

        let n = self.counter;
        let value_at = |i: usize| prepared.values.get(i).cloned().unwrap_or(ParamValue::Null);
        self.params.insert(format!("valueA_{}", n), value_at(0));
        self.params.insert(format!("valueB_{}", n), value_at(1));
        self.params
            .insert(format!("{}_{}", NOW_PARAM, n), ParamValue::Timestamp(self.options.now));

        let custom = self
            .options
            .handlers
            .and_then(|handlers| handlers.lookup(&rule.field));
        let handler: &dyn FieldHandler = custom.unwrap_or(&DefaultHandler);

        let args = FieldHandlerArgs {
            field_prefix: self.options.field_prefix,
            field: &rule.field,
            column: &rule.column,
            filter_type: rule.filter_type,
            operator: rule.operator,
            values: &prepared.values,
            rule,
            identity: self.options.identity,
            rule_index: n,
            template,
            transform: prepared.transform,
        };
        let output = handler.build(&args)?;

        for (name, value) in output.params {
            if RESERVED_PARAMS.contains(&name.as_str()) {
                tracing::error!(
                    field = %rule.field,
                    param = %name,
                    "Handler reused a reserved parameter"
                );
                return Err(QueryError::Internal(format!(
                    "Handler for field '{}' returned reserved parameter '{}'",
                    rule.field, name
                )));
            }
            self.params.insert(format!("{}_{}", name, n), value);
        }
        self.counter += 1;

        Ok(if custom.is_some() {
            format!("({})", output.sql)
        } else {
            output.sql
        })
    }
}
