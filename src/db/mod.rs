mod connection;
mod entries;
mod migrations;
mod models;

pub use connection::Database;
pub use models::{DiaryEntry, EntryChange, NewEntry};
