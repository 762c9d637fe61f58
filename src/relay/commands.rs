//! Built-in `!` commands.
//!
//! Only names listed here are built-ins; any other `!word` is left for the
//! pattern matcher so it can reach the knowledge bots.

/// Who may run a command, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restriction {
    None,
    /// Only users in the admin set.
    Admin,
    /// Not in direct messages.
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCommand {
    BotHelp,
    Version,
    Status,
    ListRoles,
    AddRole,
    RemoveRole,
    Glasses,
    Deal,
    Dance,
    ZxcDance,
}

impl BuiltinCommand {
    pub const ALL: [BuiltinCommand; 10] = [
        Self::BotHelp,
        Self::Version,
        Self::Status,
        Self::ListRoles,
        Self::AddRole,
        Self::RemoveRole,
        Self::Glasses,
        Self::Deal,
        Self::Dance,
        Self::ZxcDance,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.name().eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BotHelp => "bothelp",
            Self::Version => "version",
            Self::Status => "status",
            Self::ListRoles => "listroles",
            Self::AddRole => "addrole",
            Self::RemoveRole => "removerole",
            Self::Glasses => "glasses",
            Self::Deal => "deal",
            Self::Dance => "dance",
            Self::ZxcDance => "zxcdance",
        }
    }

    pub fn restriction(&self) -> Restriction {
        match self {
            Self::Version | Self::Status => Restriction::Admin,
            Self::ListRoles | Self::AddRole | Self::RemoveRole => Restriction::Channel,
            _ => Restriction::None,
        }
    }

    /// Placeholder shown in help for the required argument.
    pub fn argument(&self) -> Option<&'static str> {
        match self {
            Self::AddRole | Self::RemoveRole => Some("ROLE"),
            _ => None,
        }
    }

    /// Whether the command may act on another user given as a mention.
    pub fn accepts_target(&self) -> bool {
        matches!(self, Self::AddRole | Self::RemoveRole)
    }
}

/// A built-in command as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: BuiltinCommand,
    /// User mentioned as the first argument.
    pub target: Option<u64>,
    pub argument: Option<String>,
}

/// A permitted built-in command ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: BuiltinCommand,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub user_id: u64,
    pub user_name: String,
    /// User the command acts on (the invoker unless an admin targeted someone).
    pub subject_id: u64,
    pub argument: Option<String>,
}

/// Parse `content` as a built-in command.
pub fn parse(content: &str) -> Option<ParsedCommand> {
    let rest = content.strip_prefix('!')?;
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let command = BuiltinCommand::from_name(name)?;

    let (target, args) = match args.split_once(char::is_whitespace) {
        Some((first, remaining)) => match parse_mention(first) {
            Some(id) => (Some(id), remaining.trim()),
            None => (None, args),
        },
        None => match parse_mention(args) {
            Some(id) => (Some(id), ""),
            None => (None, args),
        },
    };

    Some(ParsedCommand {
        command,
        target,
        argument: (!args.is_empty()).then(|| args.to_string()),
    })
}

/// Parse a Discord user mention (`<@123>` or `<@!123>`).
pub fn parse_mention(token: &str) -> Option<u64> {
    let inner = token.strip_prefix("<@")?.strip_suffix('>')?;
    inner.strip_prefix('!').unwrap_or(inner).parse().ok()
}

/// `!bothelp` reply.
pub fn help_text() -> String {
    let listed: Vec<String> = BuiltinCommand::ALL
        .iter()
        .filter(|command| command.restriction() != Restriction::Admin)
        .map(|command| match command.argument() {
            Some(arg) => format!("`!{} {}`", command.name(), arg),
            None => format!("`!{}`", command.name()),
        })
        .collect();
    format!("Available commands: {}", listed.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let parsed = parse("!bothelp").unwrap();
        assert_eq!(parsed.command, BuiltinCommand::BotHelp);
        assert!(parsed.target.is_none());
        assert!(parsed.argument.is_none());
    }

    #[test]
    fn test_parse_with_argument() {
        let parsed = parse("!addrole  Tournament Player ").unwrap();
        assert_eq!(parsed.command, BuiltinCommand::AddRole);
        assert_eq!(parsed.argument.as_deref(), Some("Tournament Player"));
    }

    #[test]
    fn test_parse_with_target() {
        let parsed = parse("!removerole <@!42> Streaming").unwrap();
        assert_eq!(parsed.target, Some(42));
        assert_eq!(parsed.argument.as_deref(), Some("Streaming"));

        let parsed = parse("!addrole <@42>").unwrap();
        assert_eq!(parsed.target, Some(42));
        assert!(parsed.argument.is_none());
    }

    #[test]
    fn test_unknown_commands_fall_through() {
        assert!(parse("!lg * won").is_none());
        assert!(parse("??foo").is_none());
        assert!(parse("bothelp").is_none());
    }

    #[test]
    fn test_names_case_insensitive() {
        assert_eq!(parse("!VERSION").unwrap().command, BuiltinCommand::Version);
    }

    #[test]
    fn test_parse_mention() {
        assert_eq!(parse_mention("<@123>"), Some(123));
        assert_eq!(parse_mention("<@!123>"), Some(123));
        assert_eq!(parse_mention("<@&123>"), None);
        assert_eq!(parse_mention("@123"), None);
    }

    #[test]
    fn test_help_hides_admin_commands() {
        let help = help_text();
        assert!(help.contains("`!addrole ROLE`"));
        assert!(help.contains("`!dance`"));
        assert!(!help.contains("version"));
        assert!(!help.contains("status"));
    }
}
