//! Configuration validation.
//!
//! Validates configuration values and collects every problem into a single
//! error so the operator can fix them in one pass.

use std::collections::HashSet;

use crate::common::error::ConfigError;
use crate::config::types::Config;
use crate::relay::matcher::CompiledPattern;

const PLACEHOLDER_TOKEN: &str = "YOUR_DISCORD_TOKEN_HERE";

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Discord
    let discord = &config.discord;
    if discord.token.is_empty() {
        errors.push("discord.token is required".to_string());
    }
    if discord.token == PLACEHOLDER_TOKEN {
        errors.push("discord.token has not been configured (still using placeholder)".to_string());
    }
    if discord.command_limit == 0 {
        errors.push("discord.command_limit must be greater than zero".to_string());
    }
    if discord.command_period == 0 {
        errors.push("discord.command_period must be greater than zero".to_string());
    }
    if discord.user_command_limit == Some(0) {
        errors.push("discord.user_command_limit must be greater than zero when set".to_string());
    }
    if discord.request_timeout == 0 {
        errors.push("discord.request_timeout must be greater than zero".to_string());
    }
    if discord.use_streaming_role && discord.streaming_role.trim().is_empty() {
        errors.push("discord.streaming_role is required when use_streaming_role is set".to_string());
    }

    // IRC endpoint
    let irc = &config.irc;
    if irc.hostname.is_empty() {
        errors.push("irc.hostname is required".to_string());
    }
    if irc.port == 0 {
        errors.push("irc.port must be non-zero".to_string());
    }
    if irc.nick.is_empty() {
        errors.push("irc.nick is required".to_string());
    }
    if irc.nick.contains(char::is_whitespace) {
        errors.push(format!("irc.nick '{}' must not contain whitespace", irc.nick));
    }
    match (&irc.username, &irc.password) {
        (Some(_), None) => errors.push("irc.password is required when irc.username is set".to_string()),
        (None, Some(_)) => errors.push("irc.username is required when irc.password is set".to_string()),
        _ => {}
    }
    if irc.queue_size == 0 {
        errors.push("irc.queue_size must be greater than zero".to_string());
    }
    if irc.reconnect_min_delay == 0 {
        errors.push("irc.reconnect_min_delay must be greater than zero".to_string());
    }
    if irc.reconnect_min_delay > irc.reconnect_max_delay {
        errors.push(format!(
            "irc.reconnect_min_delay ({}) exceeds irc.reconnect_max_delay ({})",
            irc.reconnect_min_delay, irc.reconnect_max_delay
        ));
    }

    // Bots and patterns
    if irc.bots.is_empty() {
        errors.push("irc.bots is empty - no commands will be relayed".to_string());
    }
    let mut seen = HashSet::new();
    for (i, bot) in irc.bots.iter().enumerate() {
        if bot.nick.is_empty() {
            errors.push(format!("irc.bots[{}].nick is required", i));
            continue;
        }
        if !seen.insert(bot.nick.to_ascii_lowercase()) {
            errors.push(format!("irc.bots[{}].nick '{}' is a duplicate", i, bot.nick));
        }
        if bot.categories.iter().all(|c| c.patterns.is_empty()) {
            errors.push(format!("irc.bots[{}] ({}) has no patterns", i, bot.nick));
        }
        for category in &bot.categories {
            check_patterns(
                &format!("bots.{}.{}", bot.nick, category.name),
                &category.patterns,
                &mut errors,
            );
        }
    }
    check_patterns("irc.bad_patterns", &irc.bad_patterns, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

fn check_patterns(field: &str, patterns: &[String], errors: &mut Vec<String>) {
    for (i, pattern) in patterns.iter().enumerate() {
        if let Err(e) = CompiledPattern::new(pattern) {
            errors.push(format!(
                "{}[{}] is not a valid regex: '{}' ({})",
                field, i, pattern, e
            ));
        }
    }
}
