//! Database layer for docsync

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{LibSqlSessionRepository, SessionRepository};
