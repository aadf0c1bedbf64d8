pub mod service;
pub mod state;

pub use service::{CreateGroup, GroupsService, InviteView};
