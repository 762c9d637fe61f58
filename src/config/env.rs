//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `CEREBOT_DISCORD_TOKEN` - Discord bot token
//! - `CEREBOT_IRC_HOSTNAME` - IRC server host
//! - `CEREBOT_IRC_PORT` - IRC server port
//! - `CEREBOT_IRC_USERNAME` - SASL account name
//! - `CEREBOT_IRC_PASSWORD` - SASL password

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "CEREBOT";

/// Default config file, relative to the working directory.
const DEFAULT_CONFIG_FILE: &str = "cerebot_config.toml";

/// Apply environment variable overrides to a config.
///
/// This allows secrets like the token and SASL password to be provided via
/// environment variables instead of the config file.
pub fn apply_env_overrides(config: Config) -> Config {
    apply_overrides_from(config, |name| env::var(name).ok())
}

fn apply_overrides_from(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    let var = |suffix: &str| lookup(&format!("{}_{}", ENV_PREFIX, suffix));

    if let Some(token) = var("DISCORD_TOKEN") {
        config.discord.token = token;
    }

    if let Some(host) = var("IRC_HOSTNAME") {
        config.irc.hostname = host;
    }
    if let Some(port) = var("IRC_PORT") {
        if let Ok(port) = port.parse() {
            config.irc.port = port;
        }
    }
    if let Some(username) = var("IRC_USERNAME") {
        config.irc.username = Some(username);
    }
    if let Some(password) = var("IRC_PASSWORD") {
        config.irc.password = Some(password);
    }

    config
}

/// Get the config file path.
///
/// `-c <file>` on the command line wins, then `CEREBOT_CONFIG`, then
/// `cerebot_config.toml`.
pub fn get_config_path() -> String {
    config_path_from(env::args().skip(1), env::var(format!("{}_CONFIG", ENV_PREFIX)).ok())
}

fn config_path_from(mut args: impl Iterator<Item = String>, env_value: Option<String>) -> String {
    while let Some(arg) = args.next() {
        if arg == "-c" {
            if let Some(path) = args.next() {
                return path;
            }
        }
    }
    env_value.unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::types::*;

    fn make_test_config() -> Config {
        crate::config::parser::load_config_str(
            r#"
[irc]
hostname = "irc.example.org"
port = 6667
nick = "Cerebot"

[discord]
token = "original_token"
command_limit = 5
command_period = 10
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(ENV_PREFIX, "CEREBOT");
    }

    #[test]
    fn test_overrides_applied() {
        let vars: HashMap<&str, &str> = [
            ("CEREBOT_DISCORD_TOKEN", "from_env"),
            ("CEREBOT_IRC_PORT", "6697"),
            ("CEREBOT_IRC_PASSWORD", "hunter2"),
        ]
        .into_iter()
        .collect();

        let config = apply_overrides_from(make_test_config(), |name| {
            vars.get(name).map(|v| v.to_string())
        });

        assert_eq!(config.discord.token, "from_env");
        assert_eq!(config.irc.port, 6697);
        assert_eq!(config.irc.password.as_deref(), Some("hunter2"));
        assert_eq!(config.irc.hostname, "irc.example.org");
    }

    #[test]
    fn test_bad_port_ignored() {
        let config = apply_overrides_from(make_test_config(), |name| {
            (name == "CEREBOT_IRC_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.irc.port, 6667);
    }

    #[test]
    fn test_no_overrides() {
        let config: Config = apply_overrides_from(make_test_config(), |_| None);
        assert_eq!(config.discord.token, "original_token");
        assert!(config.irc.username.is_none());
    }

    #[test]
    fn test_config_path_resolution() {
        let args = vec!["-c".to_string(), "custom.toml".to_string()];
        assert_eq!(
            config_path_from(args.into_iter(), Some("env.toml".to_string())),
            "custom.toml"
        );
        assert_eq!(
            config_path_from(std::iter::empty(), Some("env.toml".to_string())),
            "env.toml"
        );
        assert_eq!(config_path_from(std::iter::empty(), None), "cerebot_config.toml");
    }
}
