//! API-facing request, response and error types

pub mod types;
