//! Configuration type definitions.
//!
//! These mirror the TOML file one to one. The validated, compiled form the
//! relay runs on lives in [`crate::config::relay`].

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub irc: IrcConfig,
    pub discord: DiscordConfig,
}

/// IRC server connection and knowledge bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    pub hostname: String,
    pub port: u16,
    #[serde(default)]
    pub use_ssl: bool,
    pub nick: String,
    /// SASL account name. Requires `password`.
    pub username: Option<String>,
    /// SASL password. Requires `username`.
    pub password: Option<String>,
    /// Maximum number of lines held while the link is down.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Minimum spacing between outbound lines.
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    /// Initial reconnect delay in seconds.
    #[serde(default = "default_reconnect_min_delay")]
    pub reconnect_min_delay: u64,
    /// Reconnect delay cap in seconds.
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay: u64,
    /// Messages matching any of these are never relayed.
    #[serde(default)]
    pub bad_patterns: Vec<String>,
    /// Knowledge bots, in matching order.
    #[serde(default)]
    pub bots: Vec<BotConfig>,
}

/// One IRC knowledge bot.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub nick: String,
    /// The bot echoes a `!RELAY -prefix` token in its replies.
    #[serde(default)]
    pub relay_tokens: bool,
    /// Render replies as a Discord code block.
    #[serde(default)]
    pub code_block: bool,
    /// Pattern categories, in matching order.
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

/// A named group of patterns for one bot.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub patterns: Vec<String>,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    /// Commands admitted per `command_period` across all users.
    pub command_limit: u32,
    /// Sliding window length in seconds.
    pub command_period: u64,
    /// Commands admitted per `command_period` for a single user.
    pub user_command_limit: Option<u32>,
    /// Seconds to wait for a bot reply before giving up on a request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default)]
    pub admins: Vec<u64>,
    #[serde(default)]
    pub ignored: Vec<u64>,
    #[serde(default)]
    pub use_streaming_role: bool,
    #[serde(default = "default_streaming_role")]
    pub streaming_role: String,
    /// Prefix relayed replies with a mention of the requester.
    #[serde(default)]
    pub mention_requester: bool,
}

fn default_queue_size() -> usize {
    100
}

fn default_send_interval_ms() -> u64 {
    500
}

fn default_reconnect_min_delay() -> u64 {
    5
}

fn default_reconnect_max_delay() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

fn default_streaming_role() -> String {
    "Streaming".to_string()
}
