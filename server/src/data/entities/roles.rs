//! Contact roles, keyed by (contact, role type)

use crate::data::query::{FieldDescriptor, FieldHandlers, FilterType, Filters};

use super::{ColumnType, EntityDef};
use super::contacts::ROLE_TYPES;

pub(super) fn definition() -> EntityDef {
    let filters = Filters::new()
        .field(
            "contact",
            FieldDescriptor::new(FilterType::Contact).with_column("contact_id"),
        )
        .field(
            "type",
            FieldDescriptor::new(FilterType::Enum).with_enum_values(ROLE_TYPES),
        )
        .field(
            "dateAdded",
            FieldDescriptor::new(FilterType::Date).with_column("date_added"),
        )
        .field(
            "dateExpires",
            FieldDescriptor::new(FilterType::Date)
                .nullable()
                .with_column("date_expires"),
        );

    EntityDef {
        name: "contact_roles",
        table: "contact_roles",
        alias: "item",
        primary_key: &["contact_id", "type"],
        sortable: &["dateAdded", "dateExpires"],
        columns: &[("date_expires", ColumnType::Timestamp)],
        filters,
        handlers: FieldHandlers::new(),
    }
}
