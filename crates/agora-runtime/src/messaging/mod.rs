//! Mailboxes and messages
//!
//! The sending operations themselves live on
//! [`AgentContext`](crate::AgentContext) because they need the sender's
//! identity; address resolution happens in the
//! [`Organization`](crate::organization::Organization).

mod mailbox;
mod message;

pub use mailbox::Mailbox;
pub use message::Message;
