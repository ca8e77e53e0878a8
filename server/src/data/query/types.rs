//! Rule tree and schema types
//!
//! Wire types (`Rule`, `RuleGroup`, `RuleNode`) deserialize straight from the
//! client JSON. `Validated*` types are only produced by the validator and carry
//! the resolved field type, column and parsed operator.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operators::Operator;

/// Declared semantic type of a filterable field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Text,
    Blob,
    Number,
    Date,
    Boolean,
    Array,
    Enum,
    Contact,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Blob => "blob",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Enum => "enum",
            Self::Contact => "contact",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema entry for one filterable field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub filter_type: FilterType,
    pub nullable: bool,
    pub enum_values: Option<Vec<String>>,
    /// Database column when it differs from the API field name
    pub column: Option<String>,
}

impl FieldDescriptor {
    pub fn new(filter_type: FilterType) -> Self {
        Self {
            filter_type,
            nullable: false,
            enum_values: None,
            column: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_enum_values(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_column(mut self, column: &str) -> Self {
        self.column = Some(column.to_string());
        self
    }
}

/// Per-entity field schema: API field name → descriptor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    fields: BTreeMap<String, FieldDescriptor>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name.into(), descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Column for a field, falling back to the field name itself
    pub fn column_of<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.fields
            .get(name)
            .map(|d| d.column.as_deref().unwrap_or(name))
    }
}

/// A raw rule value as sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for RuleValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RuleValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for RuleValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for RuleValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for RuleValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// A single filter condition as received on the wire
///
/// `operator` stays a string here so an unknown name can be reported together
/// with the offending rule instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Vec<RuleValue>,
}

impl Rule {
    pub fn new(field: &str, operator: &str, value: Vec<RuleValue>) -> Self {
        Self {
            field: field.to_string(),
            operator: operator.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupCondition {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl GroupCondition {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// An AND/OR combination of rules and nested groups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    #[serde(default)]
    pub condition: GroupCondition,
    pub rules: Vec<RuleNode>,
}

impl RuleGroup {
    pub fn and(rules: Vec<RuleNode>) -> Self {
        Self {
            condition: GroupCondition::And,
            rules,
        }
    }

    pub fn or(rules: Vec<RuleNode>) -> Self {
        Self {
            condition: GroupCondition::Or,
            rules,
        }
    }

    /// Wrap this tree under a mandatory top-level AND rule
    ///
    /// Used by callers to layer visibility scoping (e.g. "own rows only")
    /// on top of whatever the client asked for.
    pub fn scoped(self, mandatory: Rule) -> Self {
        Self::and(vec![RuleNode::Rule(mandatory), RuleNode::Group(self)])
    }

    /// Number of leaf rules anywhere in the tree
    pub fn leaf_count(&self) -> usize {
        self.rules
            .iter()
            .map(|node| match node {
                RuleNode::Rule(_) => 1,
                RuleNode::Group(group) => group.leaf_count(),
            })
            .sum()
    }

    /// Nesting depth, counting this group as 1
    pub fn depth(&self) -> usize {
        1 + self
            .rules
            .iter()
            .map(|node| match node {
                RuleNode::Rule(_) => 0,
                RuleNode::Group(group) => group.depth(),
            })
            .max()
            .unwrap_or(0)
    }
}

/// Either a leaf rule or a nested group
///
/// The wire format has no discriminant; a node with `rules` is a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleNode {
    Group(RuleGroup),
    Rule(Rule),
}

impl From<Rule> for RuleNode {
    fn from(rule: Rule) -> Self {
        Self::Rule(rule)
    }
}

impl From<RuleGroup> for RuleNode {
    fn from(group: RuleGroup) -> Self {
        Self::Group(group)
    }
}

/// A rule whose field, operator and arity have been checked against `Filters`
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRule {
    pub field: String,
    pub column: String,
    pub filter_type: FilterType,
    pub nullable: bool,
    pub operator: Operator,
    pub values: Vec<RuleValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedNode {
    Group(ValidatedRuleGroup),
    Rule(ValidatedRule),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedRuleGroup {
    pub condition: GroupCondition,
    pub rules: Vec<ValidatedNode>,
}

impl From<&ValidatedRule> for Rule {
    fn from(rule: &ValidatedRule) -> Self {
        Self {
            field: rule.field.clone(),
            operator: rule.operator.as_str().to_string(),
            value: rule.values.clone(),
        }
    }
}

impl From<&ValidatedRuleGroup> for RuleGroup {
    fn from(group: &ValidatedRuleGroup) -> Self {
        Self {
            condition: group.condition,
            rules: group
                .rules
                .iter()
                .map(|node| match node {
                    ValidatedNode::Group(g) => RuleNode::Group(g.into()),
                    ValidatedNode::Rule(r) => RuleNode::Rule(r.into()),
                })
                .collect(),
        }
    }
}

/// The caller on whose behalf a query runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingIdentity {
    pub id: String,
    pub admin: bool,
}

impl ActingIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            admin: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            admin: true,
        }
    }
}

/// A typed value bound into the final query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    TextList(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(list: Vec<String>) -> Self {
        Self::TextList(list)
    }
}

/// Named parameters collected during a single compile call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamBag {
    values: BTreeMap<String, ParamValue>,
}

impl ParamBag {
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_nested_rule_group() {
        let json = r#"{
            "condition": "OR",
            "rules": [
                {"field": "status", "operator": "equal", "value": ["open"]},
                {"condition": "AND", "rules": [
                    {"field": "amount", "operator": "between", "value": [1, 10.5]},
                    {"field": "hidden", "operator": "equal", "value": [false]}
                ]}
            ]
        }"#;
        let group: RuleGroup = serde_json::from_str(json).unwrap();

        assert_eq!(group.condition, GroupCondition::Or);
        assert_eq!(group.leaf_count(), 3);
        assert_eq!(group.depth(), 2);
        match &group.rules[1] {
            RuleNode::Group(inner) => {
                let RuleNode::Rule(rule) = &inner.rules[0] else {
                    panic!("expected rule");
                };
                assert_eq!(
                    rule.value,
                    vec![RuleValue::Number(1.0), RuleValue::Number(10.5)]
                );
                let RuleNode::Rule(rule) = &inner.rules[1] else {
                    panic!("expected rule");
                };
                assert_eq!(rule.value, vec![RuleValue::Bool(false)]);
            }
            RuleNode::Rule(_) => panic!("expected nested group"),
        }
    }

    #[test]
    fn condition_defaults_to_and() {
        let group: RuleGroup = serde_json::from_str(r#"{"rules": []}"#).unwrap();
        assert_eq!(group.condition, GroupCondition::And);
    }

    #[test]
    fn missing_value_defaults_to_empty() {
        let rule: Rule =
            serde_json::from_str(r#"{"field": "email", "operator": "is_empty"}"#).unwrap();
        assert!(rule.value.is_empty());
    }

    #[test]
    fn scoped_wraps_client_tree() {
        let client = RuleGroup::or(vec![
            Rule::new("status", "equal", vec!["open".into()]).into(),
        ]);
        let scoped = client
            .clone()
            .scoped(Rule::new("contact", "equal", vec!["me".into()]));

        assert_eq!(scoped.condition, GroupCondition::And);
        assert_eq!(scoped.rules.len(), 2);
        assert_eq!(scoped.rules[1], RuleNode::Group(client));
    }

    #[test]
    fn filters_column_fallback() {
        let filters = Filters::new()
            .field("email", FieldDescriptor::new(FilterType::Text))
            .field(
                "lastSeen",
                FieldDescriptor::new(FilterType::Date).with_column("last_seen"),
            );
        assert_eq!(filters.column_of("email"), Some("email"));
        assert_eq!(filters.column_of("lastSeen"), Some("last_seen"));
        assert_eq!(filters.column_of("missing"), None);
    }
}
