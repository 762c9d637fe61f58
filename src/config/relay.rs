//! Runtime form of the configuration.
//!
//! Built once from a validated [`Config`]: patterns are compiled, durations
//! converted and ID lists turned into sets. Shared read-only afterwards.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::common::error::ConfigError;
use crate::common::reconnect::ReconnectPolicy;
use crate::config::types::Config;
use crate::relay::matcher::{compile_patterns, BotTarget, CompiledPattern};

/// A string that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// SASL PLAIN account.
#[derive(Debug, Clone)]
pub struct SaslCredentials {
    pub username: String,
    pub password: Secret,
}

#[derive(Debug, Clone)]
pub struct IrcSettings {
    pub hostname: String,
    pub port: u16,
    pub use_ssl: bool,
    pub nick: String,
    pub sasl: Option<SaslCredentials>,
    pub queue_size: usize,
    pub send_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

#[derive(Debug, Clone)]
pub struct DiscordSettings {
    pub token: Secret,
    pub command_limit: u32,
    pub command_period: Duration,
    pub user_command_limit: Option<u32>,
    pub request_timeout: Duration,
    pub admins: HashSet<u64>,
    pub ignored: HashSet<u64>,
    /// Role name to manage for streaming members, when enabled.
    pub streaming_role: Option<String>,
    pub mention_requester: bool,
}

/// Everything the relay needs, compiled and immutable.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub irc: IrcSettings,
    pub discord: DiscordSettings,
    /// Knowledge bots, in matching order.
    pub bots: Arc<[BotTarget]>,
    pub bad_patterns: Vec<CompiledPattern>,
}

impl RelayConfig {
    /// Compile a configuration that already passed validation.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let irc = &config.irc;
        let discord = &config.discord;

        let bots = irc
            .bots
            .iter()
            .map(BotTarget::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        let bad_patterns = compile_patterns("irc.bad_patterns", &irc.bad_patterns)?;

        let sasl = match (&irc.username, &irc.password) {
            (Some(username), Some(password)) => Some(SaslCredentials {
                username: username.clone(),
                password: Secret::new(password.clone()),
            }),
            _ => None,
        };

        Ok(Self {
            irc: IrcSettings {
                hostname: irc.hostname.clone(),
                port: irc.port,
                use_ssl: irc.use_ssl,
                nick: irc.nick.clone(),
                sasl,
                queue_size: irc.queue_size,
                send_interval: Duration::from_millis(irc.send_interval_ms),
                reconnect: ReconnectPolicy {
                    min_delay: Duration::from_secs(irc.reconnect_min_delay),
                    max_delay: Duration::from_secs(irc.reconnect_max_delay),
                    ..ReconnectPolicy::default()
                },
            },
            discord: DiscordSettings {
                token: Secret::new(discord.token.clone()),
                command_limit: discord.command_limit,
                command_period: Duration::from_secs(discord.command_period),
                user_command_limit: discord.user_command_limit,
                request_timeout: Duration::from_secs(discord.request_timeout),
                admins: discord.admins.iter().copied().collect(),
                ignored: discord.ignored.iter().copied().collect(),
                streaming_role: discord
                    .use_streaming_role
                    .then(|| discord.streaming_role.clone()),
                mention_requester: discord.mention_requester,
            },
            bots: bots.into(),
            bad_patterns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::load_config_str;

    const SAMPLE: &str = r#"
[irc]
hostname = "irc.libera.chat"
port = 6697
use_ssl = true
nick = "Cerebot"
username = "Cerebot"
password = "hunter2"
send_interval_ms = 250
bad_patterns = ["^!RELAY"]

[[irc.bots]]
nick = "Sequell"
relay_tokens = true

[[irc.bots.categories]]
name = "sequell_patterns"
patterns = ["^!\\w+"]

[[irc.bots]]
nick = "Gretell"
code_block = true

[[irc.bots.categories]]
name = "monster_patterns"
patterns = ["^@\\?"]

[discord]
token = "secret-token"
command_limit = 10
command_period = 20
admins = [1, 2]
ignored = [3]
use_streaming_role = true
"#;

    #[test]
    fn test_from_config() {
        let relay = RelayConfig::from_config(&load_config_str(SAMPLE).unwrap()).unwrap();

        assert_eq!(relay.bots.len(), 2);
        assert_eq!(relay.bots[0].nick, "Sequell");
        assert!(relay.bots[1].code_block);
        assert_eq!(relay.bad_patterns.len(), 1);
        assert_eq!(relay.irc.send_interval, Duration::from_millis(250));
        assert_eq!(relay.irc.sasl.as_ref().unwrap().username, "Cerebot");
        assert_eq!(relay.discord.command_period, Duration::from_secs(20));
        assert!(relay.discord.admins.contains(&2));
        assert!(relay.discord.ignored.contains(&3));
        assert_eq!(relay.discord.streaming_role.as_deref(), Some("Streaming"));
        assert_eq!(relay.discord.token.expose(), "secret-token");
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let relay = RelayConfig::from_config(&load_config_str(SAMPLE).unwrap()).unwrap();
        let printed = format!("{:?}", relay);
        assert!(!printed.contains("secret-token"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_streaming_role_disabled() {
        let mut config = load_config_str(SAMPLE).unwrap();
        config.discord.use_streaming_role = false;
        let relay = RelayConfig::from_config(&config).unwrap();
        assert!(relay.discord.streaming_role.is_none());
    }
}
