//! Persistence collaborators: connection pooling and the message store.

pub mod connection;
pub mod message_store;

pub use connection::init_pool;
pub use message_store::{ConversationTurn, InMemoryMessageStore, MessageStore, PgMessageStore};
