//! Persistence module for healthwatch.
//!
//! SQLite storage for incident records and raw metric snapshots.

mod models;
mod store;

pub use models::*;
pub use store::*;
