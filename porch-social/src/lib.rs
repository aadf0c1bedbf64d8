pub mod linker;
pub mod service;

pub use service::{FollowOutcome, SocialService};
