//! Callout responses

use crate::data::query::{FieldDescriptor, FieldHandlers, FilterType, Filters};

use super::{ColumnType, EntityDef};

pub(super) fn definition() -> EntityDef {
    let filters = Filters::new()
        .field("id", FieldDescriptor::new(FilterType::Text))
        .field(
            "callout",
            FieldDescriptor::new(FilterType::Text).with_column("callout_slug"),
        )
        .field(
            "contact",
            FieldDescriptor::new(FilterType::Contact).with_column("contact_id"),
        )
        .field(
            "assignee",
            FieldDescriptor::new(FilterType::Contact)
                .nullable()
                .with_column("assignee_id"),
        )
        .field("number", FieldDescriptor::new(FilterType::Number))
        .field("bucket", FieldDescriptor::new(FilterType::Text).nullable())
        .field("tags", FieldDescriptor::new(FilterType::Array))
        .field(
            "createdAt",
            FieldDescriptor::new(FilterType::Date).with_column("created_at"),
        )
        .field(
            "updatedAt",
            FieldDescriptor::new(FilterType::Date).with_column("updated_at"),
        );

    EntityDef {
        name: "responses",
        table: "callout_responses",
        alias: "item",
        primary_key: &["id"],
        sortable: &["number", "createdAt", "updatedAt"],
        columns: &[
            ("contact_id", ColumnType::Text),
            ("assignee_id", ColumnType::Text),
            ("number", ColumnType::Integer),
            ("bucket", ColumnType::Text),
            ("tags", ColumnType::Jsonb),
            ("updated_at", ColumnType::Timestamp),
        ],
        filters,
        handlers: FieldHandlers::new(),
    }
}
