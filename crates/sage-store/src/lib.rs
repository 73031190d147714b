//! SQLite persistence for Sage.
//!
//! Plain repositories over a single mutexed connection: projects,
//! conversations, messages, and documents. This is the loop's read/write
//! boundary; nothing here knows about models or tools.

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{
    ChatStore, Conversation, DocumentRecord, MessageRecord, MessageRole, NewDocument, NewMessage,
    Project,
};
