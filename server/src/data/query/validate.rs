//! Rule tree validation against an entity's `Filters`

use chrono::Utc;

use super::error::QueryError;
use super::operators::{Operator, is_allowed};
use super::types::{
    FilterType, Filters, Rule, RuleGroup, RuleNode, RuleValue, ValidatedNode, ValidatedRule,
    ValidatedRuleGroup,
};
use super::values::parse_date;

/// Maximum size of a rules JSON payload (64KB)
pub const MAX_RULES_JSON_SIZE: usize = 64 * 1024;

/// Maximum number of leaf rules in one tree
pub const MAX_RULES: usize = 100;

/// Maximum group nesting depth
pub const MAX_RULE_DEPTH: usize = 10;

/// Parse a rule tree from raw JSON without checking it against a schema
pub fn parse_rules_json(json_str: &str) -> Result<RuleGroup, QueryError> {
    if json_str.len() > MAX_RULES_JSON_SIZE {
        return Err(QueryError::invalid_rules(
            "RULES_JSON_TOO_LARGE",
            format!(
                "Rules JSON exceeds maximum size of {} bytes",
                MAX_RULES_JSON_SIZE
            ),
        ));
    }

    let group: RuleGroup = serde_json::from_str(json_str)
        .map_err(|e| QueryError::invalid_rules("INVALID_RULES_JSON", e.to_string()))?;

    check_limits(&group)?;
    Ok(group)
}

/// Parse and validate a rule tree in one step
pub fn parse_rule_group(
    json_str: &str,
    filters: &Filters,
) -> Result<ValidatedRuleGroup, QueryError> {
    let group = parse_rules_json(json_str)?;
    validate(filters, &group)
}

pub(crate) fn check_limits(group: &RuleGroup) -> Result<(), QueryError> {
    if group.leaf_count() > MAX_RULES {
        return Err(QueryError::invalid_rules(
            "TOO_MANY_RULES",
            format!("Maximum {} rules allowed", MAX_RULES),
        ));
    }
    if group.depth() > MAX_RULE_DEPTH {
        return Err(QueryError::invalid_rules(
            "RULES_TOO_DEEP",
            format!("Rule groups may be nested at most {} levels", MAX_RULE_DEPTH),
        ));
    }
    Ok(())
}

/// Check every rule in the tree against `filters`
pub fn validate(filters: &Filters, group: &RuleGroup) -> Result<ValidatedRuleGroup, QueryError> {
    let rules = group
        .rules
        .iter()
        .map(|node| match node {
            RuleNode::Group(inner) => validate(filters, inner).map(ValidatedNode::Group),
            RuleNode::Rule(rule) => validate_rule(filters, rule).map(ValidatedNode::Rule),
        })
        .collect::<Result<_, _>>()?;

    Ok(ValidatedRuleGroup {
        condition: group.condition,
        rules,
    })
}

pub fn validate_rule(filters: &Filters, rule: &Rule) -> Result<ValidatedRule, QueryError> {
    let descriptor = filters
        .get(&rule.field)
        .ok_or_else(|| QueryError::invalid_rule(rule.clone(), "Unknown field"))?;
    let filter_type = descriptor.filter_type;

    let operator = Operator::parse(&rule.operator).ok_or_else(|| {
        QueryError::invalid_rule(
            rule.clone(),
            format!("Unknown operator '{}'", rule.operator),
        )
    })?;

    if !is_allowed(filter_type, operator) {
        return Err(QueryError::invalid_rule(
            rule.clone(),
            format!(
                "Operator '{}' is not allowed for {} fields",
                operator, filter_type
            ),
        ));
    }

    if rule.value.len() != operator.arity() {
        return Err(QueryError::invalid_rule(
            rule.clone(),
            format!(
                "Operator '{}' expects {} value(s), got {}",
                operator,
                operator.arity(),
                rule.value.len()
            ),
        ));
    }

    for value in &rule.value {
        check_value(filter_type, value)
            .map_err(|msg| QueryError::invalid_rule(rule.clone(), msg))?;
        if let (Some(allowed), RuleValue::Text(text)) = (&descriptor.enum_values, value)
            && !allowed.iter().any(|v| v == text)
        {
            return Err(QueryError::invalid_rule(
                rule.clone(),
                format!("Value '{}' is not one of: {}", text, allowed.join(", ")),
            ));
        }
    }

    let column = descriptor.column.as_deref().unwrap_or(rule.field.as_str());

    Ok(ValidatedRule {
        field: rule.field.clone(),
        column: column.to_string(),
        filter_type,
        nullable: descriptor.nullable,
        operator,
        values: rule.value.clone(),
    })
}

fn check_value(filter_type: FilterType, value: &RuleValue) -> Result<(), String> {
    match (filter_type, value) {
        (FilterType::Number, RuleValue::Number(_)) => Ok(()),
        (FilterType::Number, RuleValue::Text(s)) if s.trim().parse::<f64>().is_ok() => Ok(()),
        (FilterType::Number, other) => Err(format!("Expected a number, got {}", other)),
        (FilterType::Boolean, RuleValue::Bool(_)) => Ok(()),
        (FilterType::Boolean, other) => Err(format!("Expected a boolean, got {}", other)),
        (FilterType::Date, RuleValue::Text(s)) => parse_date(s, Utc::now())
            .map(|_| ())
            .ok_or_else(|| format!("Invalid date value: {}", s)),
        (_, RuleValue::Text(_)) => Ok(()),
        (_, other) => Err(format!("Expected a string, got {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::query::types::{FieldDescriptor, GroupCondition};

    fn filters() -> Filters {
        Filters::new()
            .field("email", FieldDescriptor::new(FilterType::Text).nullable())
            .field(
                "dateAdded",
                FieldDescriptor::new(FilterType::Date).with_column("date_added"),
            )
            .field("amount", FieldDescriptor::new(FilterType::Number))
            .field("hidden", FieldDescriptor::new(FilterType::Boolean))
            .field("tags", FieldDescriptor::new(FilterType::Array))
            .field(
                "status",
                FieldDescriptor::new(FilterType::Enum).with_enum_values(&["open", "ended"]),
            )
            .field("contact", FieldDescriptor::new(FilterType::Contact))
    }

    fn expect_invalid_rule(
        result: Result<ValidatedRuleGroup, QueryError>,
        field: &str,
    ) -> String {
        match result {
            Err(QueryError::InvalidRule { rule, message }) => {
                assert_eq!(rule.field, field);
                message
            }
            other => panic!("expected InvalidRule, got {:?}", other),
        }
    }

    fn single(rule: Rule) -> RuleGroup {
        RuleGroup::and(vec![rule.into()])
    }

    #[test]
    fn test_valid_tree() {
        let group = RuleGroup::and(vec![
            Rule::new("email", "contains", vec!["example.com".into()]).into(),
            RuleGroup::or(vec![
                Rule::new("status", "equal", vec!["open".into()]).into(),
                Rule::new("dateAdded", "is_empty", vec![]).into(),
            ])
            .into(),
        ]);
        let validated = validate(&filters(), &group).unwrap();

        assert_eq!(validated.condition, GroupCondition::And);
        let ValidatedNode::Group(inner) = &validated.rules[1] else {
            panic!("expected group");
        };
        let ValidatedNode::Rule(rule) = &inner.rules[1] else {
            panic!("expected rule");
        };
        assert_eq!(rule.column, "date_added");
        assert_eq!(rule.operator, Operator::IsEmpty);
    }

    #[test]
    fn test_unknown_field() {
        let msg = expect_invalid_rule(
            validate(&filters(), &single(Rule::new("password", "equal", vec!["x".into()]))),
            "password",
        );
        assert_eq!(msg, "Unknown field");
    }

    #[test]
    fn test_unknown_operator() {
        let msg = expect_invalid_rule(
            validate(&filters(), &single(Rule::new("email", "like", vec!["x".into()]))),
            "email",
        );
        assert!(msg.contains("Unknown operator"));
    }

    #[test]
    fn test_operator_not_allowed_for_type() {
        let msg = expect_invalid_rule(
            validate(
                &filters(),
                &single(Rule::new("email", "greater", vec!["a".into()])),
            ),
            "email",
        );
        assert_eq!(msg, "Operator 'greater' is not allowed for text fields");

        expect_invalid_rule(
            validate(
                &filters(),
                &single(Rule::new("tags", "begins_with", vec!["a".into()])),
            ),
            "tags",
        );
    }

    #[test]
    fn test_operator_arity() {
        expect_invalid_rule(
            validate(
                &filters(),
                &single(Rule::new("email", "is_empty", vec!["x".into()])),
            ),
            "email",
        );
        expect_invalid_rule(
            validate(
                &filters(),
                &single(Rule::new("amount", "between", vec![RuleValue::Number(1.0)])),
            ),
            "amount",
        );
        expect_invalid_rule(
            validate(&filters(), &single(Rule::new("amount", "equal", vec![]))),
            "amount",
        );
        assert!(
            validate(
                &filters(),
                &single(Rule::new(
                    "amount",
                    "not_between",
                    vec![RuleValue::Number(1.0), RuleValue::Number(2.0)]
                ))
            )
            .is_ok()
        );
    }

    #[test]
    fn test_value_kinds() {
        expect_invalid_rule(
            validate(
                &filters(),
                &single(Rule::new("hidden", "equal", vec!["true".into()])),
            ),
            "hidden",
        );
        expect_invalid_rule(
            validate(
                &filters(),
                &single(Rule::new("email", "equal", vec![RuleValue::Number(3.0)])),
            ),
            "email",
        );
        expect_invalid_rule(
            validate(
                &filters(),
                &single(Rule::new("dateAdded", "equal", vec!["last tuesday".into()])),
            ),
            "dateAdded",
        );
        assert!(
            validate(
                &filters(),
                &single(Rule::new("amount", "equal", vec!["12".into()]))
            )
            .is_ok()
        );
    }

    #[test]
    fn test_enum_membership() {
        let msg = expect_invalid_rule(
            validate(
                &filters(),
                &single(Rule::new("status", "equal", vec!["draft".into()])),
            ),
            "status",
        );
        assert_eq!(msg, "Value 'draft' is not one of: open, ended");
    }

    #[test]
    fn test_error_in_nested_group_reports_leaf() {
        let group = RuleGroup::or(vec![
            Rule::new("email", "is_empty", vec![]).into(),
            RuleGroup::and(vec![Rule::new("nope", "equal", vec!["x".into()]).into()]).into(),
        ]);
        expect_invalid_rule(validate(&filters(), &group), "nope");
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let group = RuleGroup::or(vec![
            Rule::new("dateAdded", "between", vec!["2024-01".into(), "$now(d:-1)".into()]).into(),
            RuleGroup::and(vec![
                Rule::new("contact", "equal", vec!["me".into()]).into(),
                Rule::new("hidden", "equal", vec![false.into()]).into(),
            ])
            .into(),
            RuleGroup::or(vec![]).into(),
        ]);
        let once = validate(&filters(), &group).unwrap();
        let raw: RuleGroup = (&once).into();
        let twice = validate(&filters(), &raw).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_rule_group_json() {
        let json = r#"{"condition": "OR", "rules": [
            {"field": "status", "operator": "equal", "value": ["open"]},
            {"field": "status", "operator": "equal", "value": ["ended"]}
        ]}"#;
        let validated = parse_rule_group(json, &filters()).unwrap();
        assert_eq!(validated.condition, GroupCondition::Or);
        assert_eq!(validated.rules.len(), 2);
    }

    #[test]
    fn test_parse_rules_json_invalid() {
        let err = parse_rules_json("not valid json").unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidRules {
                code: "INVALID_RULES_JSON",
                ..
            }
        ));
    }

    #[test]
    fn test_parse_rules_json_too_large() {
        let json = format!(r#"{{"rules": [], "pad": "{}"}}"#, "x".repeat(MAX_RULES_JSON_SIZE));
        let err = parse_rules_json(&json).unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidRules {
                code: "RULES_JSON_TOO_LARGE",
                ..
            }
        ));
    }

    #[test]
    fn test_parse_rules_json_too_many() {
        let rules: Vec<_> = (0..=MAX_RULES)
            .map(|_| r#"{"field": "email", "operator": "is_empty"}"#)
            .collect();
        let json = format!(r#"{{"rules": [{}]}}"#, rules.join(","));
        let err = parse_rules_json(&json).unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidRules {
                code: "TOO_MANY_RULES",
                ..
            }
        ));
    }

    #[test]
    fn test_parse_rules_json_too_deep() {
        let mut group = RuleGroup::and(vec![]);
        for _ in 0..MAX_RULE_DEPTH {
            group = RuleGroup::and(vec![group.into()]);
        }
        let json = serde_json::to_string(&group).unwrap();
        let err = parse_rules_json(&json).unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidRules {
                code: "RULES_TOO_DEEP",
                ..
            }
        ));
    }
}
