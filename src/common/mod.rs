//! Common utilities and types shared across the application.

pub mod error;
pub mod messages;
pub mod reconnect;
pub mod state;

// Re-export message types from messages module
pub use messages::{
    DiscordAction, InboundMessage, IrcEvent, OutboundLine, RelayEvent, RequestId,
};
pub use state::{Backend, ConnectionState, StateTracker};
