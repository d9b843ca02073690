//! Message store - per-scope ordered, duplicate-free message lists

mod message_store;
mod scope_list;
mod tombstones;

pub use message_store::{InsertMode, MergeReport, MessageStore};
pub use scope_list::ScopeList;
pub use tombstones::Tombstones;
