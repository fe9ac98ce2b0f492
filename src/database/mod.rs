// Database module
// SQLite storage for games, their relation tables and embeddings

pub mod sqlite;

pub use sqlite::*;
