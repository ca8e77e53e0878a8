//! Operator vocabulary and per-type SQL templates
//!
//! Templates reference `{field}` plus the `:valueA` / `:valueB` placeholders.
//! The compiler substitutes the (transformed) field expression and suffixes the
//! placeholders per rule.

use std::fmt;

use super::types::FilterType;

/// Named comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Between,
    NotBetween,
    IsEmpty,
    IsNotEmpty,
    Contains,
    NotContains,
    BeginsWith,
    NotBeginsWith,
    EndsWith,
    NotEndsWith,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        let op = match s {
            "equal" => Self::Equal,
            "not_equal" => Self::NotEqual,
            "less" => Self::Less,
            "less_or_equal" => Self::LessOrEqual,
            "greater" => Self::Greater,
            "greater_or_equal" => Self::GreaterOrEqual,
            "between" => Self::Between,
            "not_between" => Self::NotBetween,
            "is_empty" => Self::IsEmpty,
            "is_not_empty" => Self::IsNotEmpty,
            "contains" => Self::Contains,
            "not_contains" => Self::NotContains,
            "begins_with" => Self::BeginsWith,
            "not_begins_with" => Self::NotBeginsWith,
            "ends_with" => Self::EndsWith,
            "not_ends_with" => Self::NotEndsWith,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::Less => "less",
            Self::LessOrEqual => "less_or_equal",
            Self::Greater => "greater",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::Between => "between",
            Self::NotBetween => "not_between",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::BeginsWith => "begins_with",
            Self::NotBeginsWith => "not_begins_with",
            Self::EndsWith => "ends_with",
            Self::NotEndsWith => "not_ends_with",
        }
    }

    /// Number of values the operator takes
    pub fn arity(&self) -> usize {
        match self {
            Self::IsEmpty | Self::IsNotEmpty => 0,
            Self::Between | Self::NotBetween => 2,
            _ => 1,
        }
    }

    /// ILIKE-based text operators whose value is a LIKE pattern fragment
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            Self::Contains
                | Self::NotContains
                | Self::BeginsWith
                | Self::NotBeginsWith
                | Self::EndsWith
                | Self::NotEndsWith
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TEXT_OPERATORS: &[Operator] = &[
    Operator::Equal,
    Operator::NotEqual,
    Operator::Contains,
    Operator::NotContains,
    Operator::IsEmpty,
    Operator::IsNotEmpty,
    Operator::BeginsWith,
    Operator::NotBeginsWith,
    Operator::EndsWith,
    Operator::NotEndsWith,
];

const ORDERED_OPERATORS: &[Operator] = &[
    Operator::Equal,
    Operator::NotEqual,
    Operator::Less,
    Operator::LessOrEqual,
    Operator::Greater,
    Operator::GreaterOrEqual,
    Operator::Between,
    Operator::NotBetween,
    Operator::IsEmpty,
    Operator::IsNotEmpty,
];

const BOOLEAN_OPERATORS: &[Operator] =
    &[Operator::Equal, Operator::IsEmpty, Operator::IsNotEmpty];

const ARRAY_OPERATORS: &[Operator] = &[
    Operator::Contains,
    Operator::NotContains,
    Operator::IsEmpty,
    Operator::IsNotEmpty,
];

const OPTION_OPERATORS: &[Operator] = &[
    Operator::Equal,
    Operator::NotEqual,
    Operator::IsEmpty,
    Operator::IsNotEmpty,
];

/// Operators a client may use on a field of the given type
pub fn allowed_operators(filter_type: FilterType) -> &'static [Operator] {
    match filter_type {
        FilterType::Text | FilterType::Blob => TEXT_OPERATORS,
        FilterType::Number | FilterType::Date => ORDERED_OPERATORS,
        FilterType::Boolean => BOOLEAN_OPERATORS,
        FilterType::Array => ARRAY_OPERATORS,
        FilterType::Enum | FilterType::Contact => OPTION_OPERATORS,
    }
}

pub fn is_allowed(filter_type: FilterType, operator: Operator) -> bool {
    allowed_operators(filter_type).contains(&operator)
}

/// SQL predicate template for one (type, operator) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template(&'static str);

impl Template {
    /// Substitute the field expression into the template
    pub fn apply(&self, field: &str) -> String {
        self.0.replace("{field}", field)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Look up the template for a (type, operator) pair
///
/// `None` means the pair is not part of the table. After validation that can
/// only happen through a bug, so callers treat it as an internal error.
pub fn operator_template(filter_type: FilterType, operator: Operator) -> Option<Template> {
    use Operator::*;

    let sql = match filter_type {
        FilterType::Text | FilterType::Blob => match operator {
            Equal => "{field} = :valueA",
            NotEqual => "{field} <> :valueA",
            Contains => "{field} ILIKE '%' || :valueA || '%'",
            NotContains => "{field} NOT ILIKE '%' || :valueA || '%'",
            BeginsWith => "{field} ILIKE :valueA || '%'",
            NotBeginsWith => "{field} NOT ILIKE :valueA || '%'",
            EndsWith => "{field} ILIKE '%' || :valueA",
            NotEndsWith => "{field} NOT ILIKE '%' || :valueA",
            IsEmpty => "{field} = ''",
            IsNotEmpty => "{field} <> ''",
            _ => return None,
        },
        FilterType::Number | FilterType::Date => match operator {
            Equal => "{field} = :valueA",
            NotEqual => "{field} <> :valueA",
            Less => "{field} < :valueA",
            LessOrEqual => "{field} <= :valueA",
            Greater => "{field} > :valueA",
            GreaterOrEqual => "{field} >= :valueA",
            Between => "{field} BETWEEN :valueA AND :valueB",
            NotBetween => "{field} NOT BETWEEN :valueA AND :valueB",
            IsEmpty => "{field} IS NULL",
            IsNotEmpty => "{field} IS NOT NULL",
            _ => return None,
        },
        FilterType::Boolean => match operator {
            Equal => "{field} = :valueA",
            IsEmpty => "{field} IS NULL",
            IsNotEmpty => "{field} IS NOT NULL",
            _ => return None,
        },
        FilterType::Array => match operator {
            Contains => "{field} ? :valueA",
            NotContains => "NOT (COALESCE({field}, '[]'::jsonb) ? :valueA)",
            IsEmpty => "COALESCE(jsonb_array_length({field}), 0) = 0",
            IsNotEmpty => "COALESCE(jsonb_array_length({field}), 0) > 0",
            _ => return None,
        },
        FilterType::Enum | FilterType::Contact => match operator {
            Equal => "{field} = :valueA",
            NotEqual => "{field} <> :valueA",
            IsEmpty => "{field} IS NULL",
            IsNotEmpty => "{field} IS NOT NULL",
            _ => return None,
        },
    };
    Some(Template(sql))
}
