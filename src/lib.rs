pub mod config;
pub mod error;
pub mod fetch;
pub mod filters;
pub mod output;
pub mod parser;
pub mod stats;
pub mod table;
pub mod time;

pub use error::{Error, Result};
pub use table::{Row, Table, TableStore};
