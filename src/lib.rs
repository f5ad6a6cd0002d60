// ABOUTME: Root library module for the Matrix bot binary
// ABOUTME: Exposes the Matrix platform, command handlers and event loop; the engine lives in nixbot-core

pub mod bot;
pub mod handlers;
pub mod matrix_client;
pub mod platform;
pub mod process;

// Re-export engine modules used across the binary
pub use nixbot_core::config;
pub use nixbot_core::metrics;
pub use nixbot_core::paths;
