//! Shared API types
//!
//! Request and response shapes for rule-filtered list and batch update
//! endpoints, plus the error type every handler returns.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::data::postgres::{FetchQuery, Paginated, SortOrder, UpdateSet};
use crate::data::query::validate::check_limits;
use crate::data::query::{ParamValue, QueryError, RuleGroup, parse_rules_json};

/// Maximum number of columns one batch update may set
pub const MAX_UPDATE_COLUMNS: usize = 50;

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest {
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },
    Forbidden {
        code: String,
        message: String,
    },
    Internal {
        message: String,
    },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach structured details (only kept on 400 responses)
    pub fn with_details(self, value: serde_json::Value) -> Self {
        match self {
            Self::BadRequest { code, message, .. } => Self::BadRequest {
                code,
                message,
                details: Some(value),
            },
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(self) -> serde_json::Value {
        match self {
            Self::BadRequest {
                code,
                message,
                details,
            } => {
                let mut body = serde_json::json!({
                    "error": "bad_request",
                    "code": code,
                    "message": message
                });
                if let Some(details) = details {
                    body["details"] = details;
                }
                body
            }
            Self::Forbidden { code, message } => serde_json::json!({
                "error": "forbidden",
                "code": code,
                "message": message
            }),
            Self::Internal { message } => serde_json::json!({
                "error": "internal_error",
                "code": "INTERNAL",
                "message": message
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidRule { rule, message } => {
                let message = format!("Invalid rule for field '{}': {}", rule.field, message);
                Self::bad_request("INVALID_RULE", message)
                    .with_details(serde_json::json!({ "rule": rule }))
            }
            QueryError::InvalidRules { code, message } => Self::bad_request(code, message),
            QueryError::InvalidSort(_) => Self::bad_request("INVALID_SORT", err.to_string()),
            QueryError::InvalidPagination(_) => {
                Self::bad_request("INVALID_PAGINATION", err.to_string())
            }
            QueryError::Usage { code, message } => Self::bad_request(code, message),
            QueryError::Forbidden(message) => Self::forbidden("FORBIDDEN", message),
            QueryError::Unsupported(_) | QueryError::Internal(_) => {
                tracing::error!(error = %err, "Query engine error");
                Self::internal(err.to_string())
            }
            QueryError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                Self::internal("Database operation failed")
            }
        }
    }
}

/// Join validator errors into one message
pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{}: validation failed", field))
            })
        })
        .collect::<Vec<_>>();
    messages.sort();
    messages.join("; ")
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::bad_request("VALIDATION_ERROR", format_validation_errors(&errors))
    }
}

/// Rule tree as sent by clients: a JSON object, or the same object encoded as
/// a string (query parameters)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RulesParam {
    Group(RuleGroup),
    Json(String),
}

impl RulesParam {
    pub fn into_group(self) -> Result<RuleGroup, QueryError> {
        match self {
            Self::Group(group) => {
                check_limits(&group)?;
                Ok(group)
            }
            Self::Json(json) => parse_rules_json(&json),
        }
    }
}

/// List request parameters
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ListQuery {
    pub rules: Option<RulesParam>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
    #[validate(range(min = -1, message = "limit must be a positive number or -1"))]
    pub limit: Option<i64>,
    #[validate(range(min = 0, message = "offset must be >= 0"))]
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn into_fetch_query(self) -> Result<FetchQuery, ApiError> {
        self.validate()?;
        Ok(FetchQuery {
            rules: self.rules.map(RulesParam::into_group).transpose()?,
            sort: self.sort,
            order: self.order,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

fn validate_update_columns(
    set: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), ValidationError> {
    if set.is_empty() {
        return Err(ValidationError::new("set_empty")
            .with_message("set must name at least one column".into()));
    }
    if set.len() > MAX_UPDATE_COLUMNS {
        return Err(ValidationError::new("set_too_many").with_message(
            format!("Cannot set more than {} columns at once", MAX_UPDATE_COLUMNS).into(),
        ));
    }
    Ok(())
}

/// Batch update request body
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BatchUpdateRequest {
    pub rules: RulesParam,
    #[validate(custom(function = "validate_update_columns"))]
    pub set: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub returning: bool,
}

fn param_value(column: &str, value: serde_json::Value) -> Result<ParamValue, ApiError> {
    use serde_json::Value;

    let invalid = || {
        ApiError::bad_request(
            "INVALID_UPDATE_VALUE",
            format!("Unsupported value for column '{}'", column),
        )
    };
    match value {
        Value::Null => Ok(ParamValue::Null),
        Value::Bool(b) => Ok(ParamValue::Bool(b)),
        Value::Number(n) => n.as_f64().map(ParamValue::Number).ok_or_else(invalid),
        Value::String(s) => Ok(ParamValue::Text(s)),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(invalid()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ParamValue::TextList),
        Value::Object(_) => Err(invalid()),
    }
}

impl BatchUpdateRequest {
    pub fn into_parts(self) -> Result<(RuleGroup, UpdateSet, bool), ApiError> {
        self.validate()?;
        let rules = self.rules.into_group()?;
        let mut update = UpdateSet::new();
        for (column, value) in self.set {
            let value = param_value(&column, value)?;
            update = update.set(&column, value);
        }
        Ok((rules, update, self.returning))
    }
}

/// Paginated list response
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub offset: i64,
    pub count: usize,
    pub has_more: bool,
}

impl<T> From<Paginated<T>> for PaginatedResponse<T> {
    fn from(page: Paginated<T>) -> Self {
        let has_more = page.offset + (page.count as i64) < page.total;
        Self {
            items: page.items,
            total: page.total,
            offset: page.offset,
            count: page.count,
            has_more,
        }
    }
}

/// Batch update response
#[derive(Debug, Serialize, PartialEq)]
pub struct BatchUpdateResponse {
    pub affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::query::Rule;

    #[test]
    fn test_invalid_rule_maps_to_400_with_rule() {
        let err: ApiError = QueryError::invalid_rule(
            Rule::new("email", "between", vec![]),
            "Operator 'between' is not allowed for text fields",
        )
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let body = err.body();
        assert_eq!(body["code"], "INVALID_RULE");
        assert_eq!(body["details"]["rule"]["field"], "email");
        assert_eq!(body["details"]["rule"]["operator"], "between");
    }

    #[test]
    fn test_error_status_mapping() {
        let cases: Vec<(QueryError, StatusCode)> = vec![
            (
                QueryError::usage("ME_WITHOUT_IDENTITY", "no caller"),
                StatusCode::BAD_REQUEST,
            ),
            (QueryError::InvalidSort("x".into()), StatusCode::BAD_REQUEST),
            (QueryError::Forbidden("admin only".into()), StatusCode::FORBIDDEN),
            (
                QueryError::Unsupported("composite key".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                QueryError::Database(sqlx::Error::PoolTimedOut),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status(), status);
            assert_eq!(api.into_response().status(), status);
        }
    }

    #[test]
    fn test_database_error_hides_detail() {
        let api: ApiError = QueryError::Database(sqlx::Error::PoolTimedOut).into();
        assert_eq!(api.body()["message"], "Database operation failed");
    }

    #[test]
    fn test_list_query_rules_as_string() {
        let json = r#"{
            "rules": "{\"condition\":\"AND\",\"rules\":[{\"field\":\"email\",\"operator\":\"equal\",\"value\":[\"a@b.c\"]}]}",
            "limit": 25,
            "order": "desc"
        }"#;
        let query: ListQuery = serde_json::from_str(json).unwrap();
        let fetch = query.into_fetch_query().unwrap();
        assert_eq!(fetch.rules.unwrap().leaf_count(), 1);
        assert_eq!(fetch.limit, Some(25));
        assert_eq!(fetch.order, Some(SortOrder::Desc));
    }

    #[test]
    fn test_list_query_rules_as_object() {
        let json = r#"{
            "rules": {"condition": "OR", "rules": []},
            "offset": 10
        }"#;
        let query: ListQuery = serde_json::from_str(json).unwrap();
        let fetch = query.into_fetch_query().unwrap();
        assert_eq!(fetch.rules, Some(RuleGroup::or(vec![])));
        assert_eq!(fetch.offset, Some(10));
    }

    #[test]
    fn test_list_query_validation() {
        let query = ListQuery {
            limit: Some(-5),
            offset: Some(-1),
            ..Default::default()
        };
        let err = query.into_fetch_query().unwrap_err();
        let body = err.body();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("limit must be"));
        assert!(message.contains("offset must be"));
    }

    #[test]
    fn test_list_query_bad_rules_json() {
        let query = ListQuery {
            rules: Some(RulesParam::Json("{not json".into())),
            ..Default::default()
        };
        let err = query.into_fetch_query().unwrap_err();
        assert_eq!(err.body()["code"], "INVALID_RULES_JSON");
    }

    #[test]
    fn test_batch_update_request() {
        let json = r#"{
            "rules": {"condition": "AND", "rules": []},
            "set": {"bucket": "done", "assignee_id": null, "tags": ["a", "b"]},
            "returning": true
        }"#;
        let request: BatchUpdateRequest = serde_json::from_str(json).unwrap();
        let (rules, update, returning) = request.into_parts().unwrap();
        assert_eq!(rules, RuleGroup::and(vec![]));
        assert_eq!(update.len(), 3);
        assert!(returning);
    }

    #[test]
    fn test_batch_update_request_rejects_empty_and_nested() {
        let empty: BatchUpdateRequest =
            serde_json::from_str(r#"{"rules": {"condition": "AND", "rules": []}, "set": {}}"#)
                .unwrap();
        assert_eq!(
            empty.into_parts().unwrap_err().body()["code"],
            "VALIDATION_ERROR"
        );

        let nested: BatchUpdateRequest = serde_json::from_str(
            r#"{"rules": {"condition": "AND", "rules": []}, "set": {"profile": {"a": 1}}}"#,
        )
        .unwrap();
        assert_eq!(
            nested.into_parts().unwrap_err().body()["code"],
            "INVALID_UPDATE_VALUE"
        );
    }

    #[test]
    fn test_paginated_response_has_more() {
        let page = Paginated {
            items: vec![1, 2],
            total: 5,
            offset: 2,
            count: 2,
        };
        let response = PaginatedResponse::from(page);
        assert!(response.has_more);

        let last = Paginated {
            items: vec![5],
            total: 5,
            offset: 4,
            count: 1,
        };
        assert!(!PaginatedResponse::from(last).has_more);
    }
}
