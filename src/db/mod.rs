pub mod conn;
pub mod queries;
pub mod insertions;

pub use conn::{init_schema, open_connection, open_in_memory};
