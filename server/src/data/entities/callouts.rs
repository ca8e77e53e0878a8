//! Callouts (surveys) with a status derived from their schedule

use crate::data::query::{
    FieldDescriptor, FieldHandlerArgs, FieldHandlers, FilterType, Filters, HandlerSql, Operator,
    ParamValue, QueryError,
};

use super::{ColumnType, EntityDef};

pub const CALLOUT_STATUSES: &[&str] = &["open", "scheduled", "ended", "draft"];

pub(super) fn definition() -> EntityDef {
    let filters = Filters::new()
        .field("slug", FieldDescriptor::new(FilterType::Text))
        .field("title", FieldDescriptor::new(FilterType::Text))
        .field("excerpt", FieldDescriptor::new(FilterType::Text).nullable())
        .field("starts", FieldDescriptor::new(FilterType::Date).nullable())
        .field("expires", FieldDescriptor::new(FilterType::Date).nullable())
        .field("hidden", FieldDescriptor::new(FilterType::Boolean))
        .field(
            "status",
            FieldDescriptor::new(FilterType::Enum).with_enum_values(CALLOUT_STATUSES),
        )
        .field("answeredBy", FieldDescriptor::new(FilterType::Contact));

    let handlers = FieldHandlers::new()
        .with("status", status)
        .with("answeredBy", answered_by);

    EntityDef {
        name: "callouts",
        table: "callouts",
        alias: "item",
        primary_key: &["slug"],
        sortable: &["title", "starts", "expires"],
        columns: &[
            ("title", ColumnType::Text),
            ("excerpt", ColumnType::Text),
            ("starts", ColumnType::Timestamp),
            ("expires", ColumnType::Timestamp),
            ("hidden", ColumnType::Boolean),
        ],
        filters,
        handlers,
    }
}

/// Schedule condition for one status, in terms of `:now`
///
/// The four statuses partition every row and each condition is never NULL,
/// so `NOT (...)` selects exactly the other statuses.
fn status_condition(args: &FieldHandlerArgs<'_>, status: &str) -> Result<String, QueryError> {
    let starts = args.qualified("starts");
    let expires = args.qualified("expires");
    let started = format!("{starts} IS NOT NULL AND {starts} <= :now");
    let sql = match status {
        "open" => format!("{started} AND ({expires} IS NULL OR {expires} > :now)"),
        "scheduled" => format!("{starts} IS NOT NULL AND {starts} > :now"),
        "ended" => format!("{started} AND {expires} IS NOT NULL AND {expires} <= :now"),
        "draft" => format!("{starts} IS NULL"),
        other => {
            return Err(QueryError::usage(
                "INVALID_CALLOUT_STATUS",
                format!("Unknown callout status '{}'", other),
            ));
        }
    };
    Ok(args.suffix(&sql))
}

fn status(args: &FieldHandlerArgs<'_>) -> Result<HandlerSql, QueryError> {
    let value = match args.values.first() {
        Some(ParamValue::Text(value)) => value.as_str(),
        _ => return Err(args.unsupported_operator()),
    };
    let condition = status_condition(args, value)?;
    let sql = match args.operator {
        Operator::Equal => condition,
        Operator::NotEqual => format!("NOT ({})", condition),
        _ => return Err(args.unsupported_operator()),
    };
    Ok(HandlerSql::new(sql))
}

/// Callouts with at least one response from the given contact
fn answered_by(args: &FieldHandlerArgs<'_>) -> Result<HandlerSql, QueryError> {
    let sql = format!(
        "{} IN (SELECT r.callout_slug FROM callout_responses r WHERE {})",
        args.qualified("slug"),
        args.where_sql("r.contact_id")
    );
    Ok(HandlerSql::new(sql))
}

#[cfg(test)]
mod tests {
    use crate::data::query::{ActingIdentity, CompileOptions, Rule, RuleGroup, compile, validate};

    use super::*;

    #[test]
    fn test_open_or_ended() {
        let entity = definition();
        let group = RuleGroup::or(vec![
            Rule::new("status", "equal", vec!["open".into()]).into(),
            Rule::new("status", "not_equal", vec!["ended".into()]).into(),
        ]);
        let validated = validate(&entity.filters, &group).unwrap();
        let options = CompileOptions::new("item.").with_handlers(&entity.handlers);
        let compiled = compile(&validated, &options).unwrap();

        assert_eq!(
            compiled.sql,
            "((item.starts IS NOT NULL AND item.starts <= :now_0 \
             AND (item.expires IS NULL OR item.expires > :now_0)) \
             OR (NOT (item.starts IS NOT NULL AND item.starts <= :now_1 \
             AND item.expires IS NOT NULL AND item.expires <= :now_1)))"
        );
        assert!(compiled.params.contains("now_0"));
        assert!(compiled.params.contains("now_1"));
    }

    /// Status of a callout under SQL three-valued logic, `None` for NULL
    fn holds(status: &str, starts: Option<i64>, expires: Option<i64>, now: i64) -> Option<bool> {
        let and = |a: Option<bool>, b: Option<bool>| match (a, b) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        };
        let or = |a: Option<bool>, b: Option<bool>| match (a, b) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        };
        let cmp = |v: Option<i64>, f: fn(i64, i64) -> bool| v.map(|v| f(v, now));
        let started = and(Some(starts.is_some()), cmp(starts, |s, n| s <= n));
        match status {
            "open" => and(
                started,
                or(Some(expires.is_none()), cmp(expires, |e, n| e > n)),
            ),
            "scheduled" => and(Some(starts.is_some()), cmp(starts, |s, n| s > n)),
            "ended" => and(
                and(started, Some(expires.is_some())),
                cmp(expires, |e, n| e <= n),
            ),
            _ => Some(starts.is_none()),
        }
    }

    #[test]
    fn test_statuses_partition_rows() {
        let now = 10;
        let moments = [None, Some(5), Some(10), Some(15)];
        for starts in moments {
            for expires in moments {
                let matches: Vec<_> = CALLOUT_STATUSES
                    .iter()
                    .map(|status| holds(status, starts, expires, now))
                    .collect();
                assert!(
                    matches.iter().all(Option::is_some),
                    "NULL status for starts={starts:?} expires={expires:?}"
                );
                assert_eq!(
                    matches.iter().filter(|m| **m == Some(true)).count(),
                    1,
                    "starts={starts:?} expires={expires:?}"
                );
            }
        }
    }

    #[test]
    fn test_answered_by_me() {
        let entity = definition();
        let group = RuleGroup::and(vec![
            Rule::new("answeredBy", "equal", vec!["me".into()]).into(),
        ]);
        let validated = validate(&entity.filters, &group).unwrap();
        let me = ActingIdentity::new("c-9");
        let options = CompileOptions::new("item.")
            .with_handlers(&entity.handlers)
            .with_identity(Some(&me));
        let compiled = compile(&validated, &options).unwrap();

        assert_eq!(
            compiled.sql,
            "((item.slug IN (SELECT r.callout_slug FROM callout_responses r \
             WHERE r.contact_id = :valueA_0)))"
        );
        assert_eq!(
            compiled.params.get("valueA_0"),
            Some(&ParamValue::Text("c-9".into()))
        );
    }

    #[test]
    fn test_status_rejects_is_empty() {
        let entity = definition();
        let group = RuleGroup::and(vec![Rule::new("status", "is_empty", vec![]).into()]);
        let validated = validate(&entity.filters, &group).unwrap();
        let options = CompileOptions::new("item.").with_handlers(&entity.handlers);
        assert!(compile(&validated, &options).is_err());
    }
}
