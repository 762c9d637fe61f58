//! Canonical message types for relay communication.
//!
//! This module defines the single source of truth for the messages passed
//! between the Discord side, the relay router and the IRC session.

use crate::common::state::ConnectionState;
use crate::relay::commands::Invocation;

/// Identifier of one relayed command, unique for the process lifetime.
pub type RequestId = u64;

/// A chat message received from Discord.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Discord user ID of the author.
    pub user_id: u64,
    /// Author's account name.
    pub user_name: String,
    /// Channel the message was posted in.
    pub channel_id: u64,
    /// Guild of the channel (None for direct messages).
    pub guild_id: Option<u64>,
    /// Message content, already trimmed.
    pub content: String,
}

impl InboundMessage {
    pub fn is_private(&self) -> bool {
        self.guild_id.is_none()
    }
}

/// A line the router wants delivered to an IRC nick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundLine {
    /// Request this line belongs to, if it expects a reply.
    pub request_id: Option<RequestId>,
    /// IRC nick (or channel) to send to.
    pub target: String,
    /// Message text.
    pub text: String,
}

/// Events published by the IRC session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// The session moved to a new state.
    State(ConnectionState),
    /// A PRIVMSG or NOTICE addressed to us.
    Message {
        nick: String,
        text: String,
        /// CTCP ACTION (`/me`).
        action: bool,
    },
    /// The line for this request was written to the server.
    Sent(RequestId),
    /// The link dropped. Requests sent on it will never get a reply; the
    /// ones not yet sent go out after reconnecting.
    Disconnected,
    /// The outbound queue overflowed and discarded this request.
    Dropped(RequestId),
}

/// Work for the Discord outbox.
#[derive(Debug, Clone)]
pub enum DiscordAction {
    /// Post text to a channel.
    Post { channel_id: u64, content: String },
    /// Run a built-in command that needs the Discord API.
    Builtin(Invocation),
}

/// Everything the router reacts to.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    Discord(InboundMessage),
    DiscordState(ConnectionState),
    Irc(IrcEvent),
}
