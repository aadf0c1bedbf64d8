pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod memberships;
pub mod outbox;
pub mod schema;
pub mod stats;
pub mod types;

pub use config::Config;
pub use context::AppContext;
pub use db::{DbConnection, DbPool};
pub use error::{Error, Result};
