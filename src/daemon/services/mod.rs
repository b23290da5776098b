//! Storage services the backup daemon is built on.
//!
//! - [`blob`] - Object storage for archives (filesystem or in-memory)
//! - [`sqlite`] - The structured-data stores being backed up

pub mod blob;
pub mod sqlite;
