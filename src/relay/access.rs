//! Access control applied before a message reaches the router.
//!
//! Blocked patterns and ignored users are refused silently. Permission
//! problems with built-in commands are reported back to the user.

use std::collections::HashSet;

use tracing::info;

use crate::common::InboundMessage;
use crate::relay::commands::{self, BuiltinCommand, ParsedCommand, Restriction};
use crate::relay::matcher::CompiledPattern;

/// Why a message was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Matched a `bad_patterns` entry.
    BadPattern,
    /// The sender is on the ignore list.
    Ignored,
    /// Admin-only command from a non-admin.
    AdminOnly(BuiltinCommand),
    /// A non-admin tried to act on another user.
    TargetRequiresAdmin(BuiltinCommand),
    /// The targeted user is on the ignore list.
    TargetRestricted(u64),
    /// Channel-only command used in a direct message.
    ChannelOnly(BuiltinCommand),
}

impl Denial {
    /// Text shown to the invoking user, or `None` for silent denials.
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::BadPattern | Self::Ignored => None,
            Self::AdminOnly(command) => Some(format!(
                "You don't have permission to use !{}.",
                command.name()
            )),
            Self::TargetRequiresAdmin(command) => Some(format!(
                "Only admins can use !{} on another user.",
                command.name()
            )),
            Self::TargetRestricted(user_id) => {
                Some(format!("<@{}> can't be the target of a command.", user_id))
            }
            Self::ChannelOnly(_) => Some("This command must be run in a channel.".to_string()),
        }
    }
}

/// What a permitted message turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permitted {
    /// A built-in command.
    Builtin(ParsedCommand),
    /// Anything else; goes on to pattern matching.
    Text,
}

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permit {
    Allowed(Permitted),
    Denied(Denial),
}

/// Admin, ignore and blocked-pattern rules.
#[derive(Debug, Clone)]
pub struct AccessControl {
    bad_patterns: Vec<CompiledPattern>,
    admins: HashSet<u64>,
    ignored: HashSet<u64>,
}

impl AccessControl {
    pub fn new(
        bad_patterns: Vec<CompiledPattern>,
        admins: impl IntoIterator<Item = u64>,
        ignored: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            bad_patterns,
            admins: admins.into_iter().collect(),
            ignored: ignored.into_iter().collect(),
        }
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admins.contains(&user_id)
    }

    pub fn is_ignored(&self, user_id: u64) -> bool {
        self.ignored.contains(&user_id)
    }

    /// Whether `text` matches any blocked pattern.
    pub fn is_blocked(&self, text: &str) -> bool {
        self.bad_patterns.iter().any(|p| p.is_match(text))
    }

    /// Decide whether `msg` may proceed.
    pub fn permit(&self, msg: &InboundMessage) -> Permit {
        if self.is_blocked(&msg.content) {
            info!(user = msg.user_id, "Message blocked by bad pattern: {}", msg.content);
            return Permit::Denied(Denial::BadPattern);
        }

        if self.is_ignored(msg.user_id) {
            info!(user = msg.user_id, "Ignoring message from ignored user");
            return Permit::Denied(Denial::Ignored);
        }

        let Some(parsed) = commands::parse(&msg.content) else {
            return Permit::Allowed(Permitted::Text);
        };

        match self.check_command(msg, &parsed) {
            Some(denial) => {
                info!(
                    user = msg.user_id,
                    command = parsed.command.name(),
                    "Command denied: {:?}",
                    denial
                );
                Permit::Denied(denial)
            }
            None => Permit::Allowed(Permitted::Builtin(parsed)),
        }
    }

    fn check_command(&self, msg: &InboundMessage, parsed: &ParsedCommand) -> Option<Denial> {
        let command = parsed.command;
        let is_admin = self.is_admin(msg.user_id);

        match command.restriction() {
            Restriction::Admin if !is_admin => return Some(Denial::AdminOnly(command)),
            Restriction::Channel if msg.is_private() => return Some(Denial::ChannelOnly(command)),
            _ => {}
        }

        if let Some(target) = parsed.target.filter(|&t| t != msg.user_id) {
            if !command.accepts_target() || !is_admin {
                return Some(Denial::TargetRequiresAdmin(command));
            }
            if self.is_ignored(target) {
                return Some(Denial::TargetRestricted(target));
            }
        }

        None
    }
}
