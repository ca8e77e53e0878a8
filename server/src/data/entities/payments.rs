//! Payments

use crate::data::query::{FieldDescriptor, FieldHandlers, FilterType, Filters};

use super::{ColumnType, EntityDef};

pub(super) fn definition() -> EntityDef {
    let filters = Filters::new()
        .field("id", FieldDescriptor::new(FilterType::Text))
        .field(
            "contact",
            FieldDescriptor::new(FilterType::Contact)
                .nullable()
                .with_column("contact_id"),
        )
        .field(
            "chargeDate",
            FieldDescriptor::new(FilterType::Date).with_column("charge_date"),
        )
        .field("amount", FieldDescriptor::new(FilterType::Number))
        .field(
            "status",
            FieldDescriptor::new(FilterType::Enum).with_enum_values(&[
                "pending",
                "successful",
                "failed",
                "cancelled",
            ]),
        );

    EntityDef {
        name: "payments",
        table: "payments",
        alias: "item",
        primary_key: &["id"],
        sortable: &["chargeDate", "amount"],
        columns: &[
            ("contact_id", ColumnType::Text),
            ("charge_date", ColumnType::Timestamp),
            ("amount", ColumnType::Numeric),
            ("status", ColumnType::Text),
        ],
        filters,
        handlers: FieldHandlers::new(),
    }
}
