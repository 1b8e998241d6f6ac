//! Async services shared by the CLI and the session registry

mod database;

pub use database::DatabaseService;
