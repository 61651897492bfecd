//! Core data model shared by the source, target and transfer layers.
//!
//! - [`table`]: table pairs, row chunks and the offset cursor
//! - [`value`]: column values passed opaquely from source to target

pub mod table;
pub mod value;

pub use table::{Chunk, MigrationCursor, Row, TableSpec};
pub use value::Value;
