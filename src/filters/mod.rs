//! Feed subsetting stages.
//!
//! Each stage reads tables from a [`TableStore`](crate::table::TableStore),
//! builds replacement tables and commits them with `update_table`. The
//! [`subset`] module chains the stages in their only valid order.

pub mod daterange;
pub mod prune;
pub mod subset;
pub mod timerange;
pub mod trips;
