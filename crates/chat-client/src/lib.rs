//! # chat-client
//!
//! Session wiring for the message synchronization engine, plus a terminal
//! client binary.

pub mod session;

pub use session::ChatSession;
