//! SQLite-backed Index Store (spec §4.3, §6.2).

pub mod database;
pub mod migrations;
pub mod schema;

pub use database::Database;
