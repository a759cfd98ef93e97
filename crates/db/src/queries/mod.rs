// crates/db/src/queries/mod.rs
// Query layer for the verbal-assess SQLite database: nested-schema session
// rows, their per-question sub-records, and flattened item rows.

pub(crate) mod items;
pub(crate) mod row_types;
pub(crate) mod sessions;
