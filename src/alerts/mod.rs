//! Alert storage and the rolling-window threshold engine.

mod engine;
mod models;
mod schema;
mod store;

pub use engine::{AlertEngine, AlertError};
pub use models::*;
pub use store::{AlertStore, SqliteAlertStore};
