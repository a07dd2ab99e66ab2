//! Local persistence used when the hosted backend is unavailable

mod connection;
mod local_store;
mod migrations;

pub use connection::Database;
pub use local_store::{notes_key, LocalNoteStore};
