//! Discord bot integration.
//!
//! This module provides the Discord side of the relay: the gateway client,
//! message intake, delivery of router output and the Discord-only built-in
//! commands.

pub mod client;
pub mod commands;
pub mod handler;
pub mod outbox;
pub mod presence;
pub mod resolver;

// Re-export main types for external use
pub use client::DiscordBotBuilder;
