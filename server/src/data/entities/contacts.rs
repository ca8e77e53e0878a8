//! Contacts and their membership-derived virtual fields

use crate::data::query::{
    FieldDescriptor, FieldHandlerArgs, FieldHandlers, FilterType, Filters, HandlerSql, Operator,
    ParamValue, QueryError,
};

use super::{ColumnType, EntityDef};

/// Role a contact holds while their membership is current
pub const MEMBER_ROLE: &str = "member";

pub const ROLE_TYPES: &[&str] = &["member", "admin", "superadmin"];

/// Active roles at compile time; expects `:now` in scope
const ACTIVE_ROLE: &str =
    "cr.date_added <= :now AND (cr.date_expires IS NULL OR cr.date_expires > :now)";

pub(super) fn definition() -> EntityDef {
    let filters = Filters::new()
        .field("id", FieldDescriptor::new(FilterType::Contact))
        .field("email", FieldDescriptor::new(FilterType::Text))
        .field("firstname", FieldDescriptor::new(FilterType::Text))
        .field("lastname", FieldDescriptor::new(FilterType::Text))
        .field("joined", FieldDescriptor::new(FilterType::Date))
        .field(
            "lastSeen",
            FieldDescriptor::new(FilterType::Date)
                .nullable()
                .with_column("last_seen"),
        )
        .field(
            "contributionType",
            FieldDescriptor::new(FilterType::Enum)
                .with_enum_values(&["Automatic", "Manual", "Gift", "None"])
                .with_column("contribution_type"),
        )
        .field(
            "contributionMonthlyAmount",
            FieldDescriptor::new(FilterType::Number)
                .nullable()
                .with_column("contribution_monthly_amount"),
        )
        .field(
            "contributionPeriod",
            FieldDescriptor::new(FilterType::Enum)
                .nullable()
                .with_enum_values(&["monthly", "annually"])
                .with_column("contribution_period"),
        )
        .field(
            "manualPaymentSource",
            FieldDescriptor::new(FilterType::Text)
                .nullable()
                .with_column("manual_payment_source"),
        )
        .field(
            "newsletterStatus",
            FieldDescriptor::new(FilterType::Enum)
                .with_enum_values(&["subscribed", "unsubscribed", "cleaned", "pending", "none"])
                .with_column("newsletter_status"),
        )
        .field("tags", FieldDescriptor::new(FilterType::Array))
        .field("activeMembership", FieldDescriptor::new(FilterType::Boolean))
        .field("membershipStarts", FieldDescriptor::new(FilterType::Date))
        .field(
            "membershipExpires",
            FieldDescriptor::new(FilterType::Date).nullable(),
        )
        .field(
            "activePermission",
            FieldDescriptor::new(FilterType::Enum).with_enum_values(ROLE_TYPES),
        )
        .field(
            "profile.telephone",
            FieldDescriptor::new(FilterType::Text).nullable(),
        )
        .field(
            "profile.twitter",
            FieldDescriptor::new(FilterType::Text).nullable(),
        )
        .field(
            "profile.description",
            FieldDescriptor::new(FilterType::Blob).nullable(),
        )
        .field(
            "profile.preferredContact",
            FieldDescriptor::new(FilterType::Enum)
                .nullable()
                .with_enum_values(&["email", "telephone", "post"]),
        )
        .field(
            "profile.deliveryOptIn",
            FieldDescriptor::new(FilterType::Boolean),
        );

    let handlers = FieldHandlers::new()
        .with("activeMembership", active_membership)
        .with("membershipStarts", membership_date)
        .with("membershipExpires", membership_date)
        .with("activePermission", active_permission)
        .with_prefix("profile", profile_field);

    EntityDef {
        name: "contacts",
        table: "contacts",
        alias: "item",
        primary_key: &["id"],
        sortable: &[
            "email",
            "firstname",
            "lastname",
            "joined",
            "lastSeen",
            "contributionMonthlyAmount",
        ],
        columns: &[
            ("email", ColumnType::Text),
            ("firstname", ColumnType::Text),
            ("lastname", ColumnType::Text),
            ("last_seen", ColumnType::Timestamp),
            ("contribution_type", ColumnType::Text),
            ("contribution_monthly_amount", ColumnType::Numeric),
            ("contribution_period", ColumnType::Text),
            ("manual_payment_source", ColumnType::Text),
            ("newsletter_status", ColumnType::Text),
            ("tags", ColumnType::Jsonb),
            ("profile", ColumnType::Jsonb),
        ],
        filters,
        handlers,
    }
}

/// `true` matches contacts with a current member role, `false` the rest
fn active_membership(args: &FieldHandlerArgs<'_>) -> Result<HandlerSql, QueryError> {
    if args.operator != Operator::Equal {
        return Err(args.unsupported_operator());
    }
    let negate = matches!(args.values.first(), Some(ParamValue::Bool(false)));
    let sql = format!(
        "{} {}IN (SELECT cr.contact_id FROM contact_roles cr WHERE cr.type = :role AND {})",
        args.qualified("id"),
        if negate { "NOT " } else { "" },
        ACTIVE_ROLE
    );
    Ok(HandlerSql::new(args.suffix(&sql)).with_param("role", MEMBER_ROLE.into()))
}

/// Compares the start or expiry of the contact's member role
fn membership_date(args: &FieldHandlerArgs<'_>) -> Result<HandlerSql, QueryError> {
    let column = if args.field == "membershipStarts" {
        "cr.date_added"
    } else {
        "cr.date_expires"
    };
    let sql = format!(
        "{} IN (SELECT cr.contact_id FROM contact_roles cr WHERE cr.type = {} AND {})",
        args.qualified("id"),
        args.suffix(":role"),
        args.where_sql(column)
    );
    Ok(HandlerSql::new(sql).with_param("role", MEMBER_ROLE.into()))
}

/// Contacts holding (or lacking) a currently active role; admins only
fn active_permission(args: &FieldHandlerArgs<'_>) -> Result<HandlerSql, QueryError> {
    args.require_admin()?;

    let (negate, type_check) = match args.operator {
        Operator::Equal => (false, Some(args.where_sql("cr.type"))),
        Operator::NotEqual => (true, Some(args.suffix("cr.type = :valueA"))),
        Operator::IsNotEmpty => (false, None),
        Operator::IsEmpty => (true, None),
        _ => return Err(args.unsupported_operator()),
    };
    let type_check = type_check.map(|sql| format!(" AND {}", sql)).unwrap_or_default();
    let sql = format!(
        "{} {}IN (SELECT cr.contact_id FROM contact_roles cr WHERE {}{})",
        args.qualified("id"),
        if negate { "NOT " } else { "" },
        args.suffix(ACTIVE_ROLE),
        type_check
    );
    Ok(HandlerSql::new(sql))
}

/// `profile.<key>` reads from the contact's JSON profile
fn profile_field(args: &FieldHandlerArgs<'_>) -> Result<HandlerSql, QueryError> {
    let key = args.subfield().unwrap_or_default();
    let mut expr = format!("({}profile ->> '{}')", args.field_prefix, key);
    if args.filter_type == FilterType::Boolean {
        expr.push_str("::boolean");
    }
    Ok(HandlerSql::new(args.where_sql(&expr)))
}
