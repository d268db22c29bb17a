//! Indexing: chunking directory files and importing conversation logs into
//! a collection.

pub mod chunker;
pub mod conversations;
pub mod core;

pub use self::conversations::{ConversationLog, ConversationReport};
pub use self::core::{Indexer, SyncReport};
