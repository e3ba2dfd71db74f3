// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod protocol;
pub mod signal;
pub mod state;
pub mod types;
pub mod ws;

// Re-export broadcast for testing
pub mod broadcast;
