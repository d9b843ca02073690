//! Scope subscription management

mod manager;

pub use manager::SubscriptionManager;
