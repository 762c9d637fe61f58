//! Command routing and rate-limited relay engine.
//!
//! ## Module Structure
//!
//! - `access`: admin, ignore and blocked-pattern rules
//! - `channels`: communication channel structures
//! - `commands`: built-in `!` commands
//! - `formatter`: rendering of bot replies for Discord
//! - `limiter`: sliding-window rate limiting
//! - `matcher`: classification of commands into target bots
//! - `pending`: in-flight request tracking
//! - `router`: the orchestrator (`Router`)

pub mod access;
pub mod channels;
pub mod commands;
pub mod formatter;
pub mod limiter;
pub mod matcher;
pub mod pending;
pub mod router;

pub use channels::ChannelBundle;
pub use router::Router;
