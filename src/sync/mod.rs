pub mod composer;
pub mod conversation;
pub mod directory;
pub mod presence;
pub mod session;

pub use composer::{send, SendOutcome};
pub use conversation::{Conversation, ConversationState};
pub use directory::Directory;
pub use presence::PresencePublisher;
