pub mod engine;

pub use engine::{BadgeEngine, BadgeProgress};
