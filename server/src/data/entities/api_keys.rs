//! API keys

use crate::data::query::{FieldDescriptor, FieldHandlers, FilterType, Filters};

use super::{ColumnType, EntityDef};

pub(super) fn definition() -> EntityDef {
    let filters = Filters::new()
        .field("id", FieldDescriptor::new(FilterType::Text))
        .field(
            "creator",
            FieldDescriptor::new(FilterType::Contact).with_column("creator_id"),
        )
        .field(
            "description",
            FieldDescriptor::new(FilterType::Text).nullable(),
        )
        .field(
            "createdAt",
            FieldDescriptor::new(FilterType::Date).with_column("created_at"),
        )
        .field(
            "expires",
            FieldDescriptor::new(FilterType::Date).nullable(),
        );

    EntityDef {
        name: "api_keys",
        table: "api_keys",
        alias: "item",
        primary_key: &["id"],
        sortable: &["createdAt", "expires"],
        columns: &[
            ("description", ColumnType::Text),
            ("expires", ColumnType::Timestamp),
        ],
        filters,
        handlers: FieldHandlers::new(),
    }
}
