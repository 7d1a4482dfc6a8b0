//! Database module for StatusWatch.
//!
//! Provides SQLite storage with embedded migrations, the downtime state
//! machine and the repository traits the rest of the crate codes against.

mod downtime;
mod models;
mod repo;
mod store;

pub use downtime::*;
pub use models::*;
pub use repo::*;
pub use store::*;
