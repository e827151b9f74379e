//! Persistence layer — libSQL-backed settings and intake sessions.

pub mod libsql_backend;
pub mod migrations;
pub mod sessions;
pub mod settings;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use sessions::StoreSessionAdapter;
pub use settings::SettingsStore;
pub use traits::Database;
