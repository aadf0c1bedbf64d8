pub mod fanout;
pub mod presence;

pub use fanout::Notifier;
pub use presence::{LocalPresence, Presence, PushEvent, PushSender};
