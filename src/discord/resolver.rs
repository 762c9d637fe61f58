//! Mention and emoji resolution for command text.
//!
//! IRC bots only understand plain text, so Discord markup in a relayed
//! command is rewritten before it leaves: `<@id>` becomes the user name,
//! `<#id>` the channel name, `<@&id>` the role name and `<:name:id>`
//! becomes `:name:`. Anything that cannot be resolved is left as is.

use fancy_regex::{Captures, Regex};
use serenity::cache::Cache;
use serenity::model::id::{ChannelId, RoleId, UserId};

#[derive(Debug, Clone)]
pub struct CommandTextResolver {
    user: Regex,
    channel: Regex,
    role: Regex,
    /// Animated or static; only the name reaches IRC.
    emoji: Regex,
}

impl Default for CommandTextResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTextResolver {
    pub fn new() -> Self {
        Self {
            user: Regex::new(r"<@!?(\d+)>").unwrap(),
            channel: Regex::new(r"<#(\d+)>").unwrap(),
            role: Regex::new(r"<@&(\d+)>").unwrap(),
            emoji: Regex::new(r"<a?:([a-zA-Z0-9_]+):\d+>").unwrap(),
        }
    }

    /// `<@id>` to the cached user name, so `!lg <@id>` looks up that player.
    pub fn users(&self, text: &str, cache: &Cache) -> String {
        self.user
            .replace_all(text, |caps: &Captures| -> String {
                caps[1]
                    .parse::<u64>()
                    .ok()
                    .and_then(|id| cache.user(UserId::new(id)).map(|user| user.name.clone()))
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .to_string()
    }

    pub fn channels(&self, text: &str, cache: &Cache) -> String {
        self.channel
            .replace_all(text, |caps: &Captures| -> String {
                if let Ok(channel_id) = caps[1].parse::<u64>() {
                    let channel_id = ChannelId::new(channel_id);
                    let name = cache
                        .guilds()
                        .into_iter()
                        .find_map(|guild_id| {
                            cache
                                .guild(guild_id)
                                .and_then(|guild| guild.channels.get(&channel_id).map(|c| c.name.clone()))
                        });
                    if let Some(name) = name {
                        return format!("#{}", name);
                    }
                }
                caps[0].to_string()
            })
            .to_string()
    }

    pub fn roles(&self, text: &str, cache: &Cache) -> String {
        self.role
            .replace_all(text, |caps: &Captures| -> String {
                if let Ok(role_id) = caps[1].parse::<u64>() {
                    let role_id = RoleId::new(role_id);
                    let name = cache
                        .guilds()
                        .into_iter()
                        .find_map(|guild_id| {
                            cache
                                .guild(guild_id)
                                .and_then(|guild| guild.roles.get(&role_id).map(|r| r.name.clone()))
                        });
                    if let Some(name) = name {
                        return format!("@{}", name);
                    }
                }
                caps[0].to_string()
            })
            .to_string()
    }

    pub fn emoji(&self, text: &str) -> String {
        self.emoji.replace_all(text, ":$1:").to_string()
    }

    /// Rewrite a relayed command for IRC.
    pub fn resolve(&self, text: &str, cache: &Cache) -> String {
        let text = self.roles(text, cache);
        let text = self.users(&text, cache);
        let text = self.channels(&text, cache);
        self.emoji(&text)
    }
}
