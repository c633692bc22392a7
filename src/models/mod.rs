pub mod message;
pub mod profile;

pub use message::{Message, MessageId, NewMessage};
pub use profile::{Presence, Profile, UserId};
