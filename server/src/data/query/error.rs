//! Rule query error types

use thiserror::Error;

use super::types::Rule;

#[derive(Error, Debug)]
pub enum QueryError {
    /// Client sent a rule that does not fit the entity's `Filters`
    #[error("Invalid rule for field '{}': {message}", rule.field)]
    InvalidRule { rule: Box<Rule>, message: String },

    /// Rule payload rejected before per-rule validation (size, JSON, shape)
    #[error("{message}")]
    InvalidRules { code: &'static str, message: String },

    #[error("Cannot sort by: {0}")]
    InvalidSort(String),

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    /// Raised by value preparation or a field handler
    #[error("{message}")]
    Usage { code: &'static str, message: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Internal query error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl QueryError {
    pub fn invalid_rule(rule: impl Into<Rule>, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: Box::new(rule.into()),
            message: message.into(),
        }
    }

    pub fn invalid_rules(code: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidRules {
            code,
            message: message.into(),
        }
    }

    pub fn usage(code: &'static str, message: impl Into<String>) -> Self {
        Self::Usage {
            code,
            message: message.into(),
        }
    }

    /// Whether the caller (not the server) is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRule { .. }
                | Self::InvalidRules { .. }
                | Self::InvalidSort(_)
                | Self::InvalidPagination(_)
                | Self::Usage { .. }
                | Self::Forbidden(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rule_display() {
        let err = QueryError::invalid_rule(
            Rule::new("email", "between", vec![]),
            "Operator 'between' is not allowed for text fields",
        );
        assert_eq!(
            err.to_string(),
            "Invalid rule for field 'email': Operator 'between' is not allowed for text fields"
        );
    }

    #[test]
    fn test_is_client_error() {
        assert!(QueryError::usage("ME_WITHOUT_IDENTITY", "no identity").is_client_error());
        assert!(QueryError::InvalidSort("password".into()).is_client_error());
        assert!(!QueryError::Unsupported("composite key".into()).is_client_error());
        assert!(!QueryError::Internal("missing operator".into()).is_client_error());
    }
}
