//! Parsing and building of IRC protocol lines.

/// Longest line the server accepts, CRLF excluded.
pub const MAX_LINE_BYTES: usize = 510;

const CTCP_DELIM: char = '\x01';

/// One parsed IRC line. Message tags are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    /// Source, without the leading `:`.
    pub prefix: Option<String>,
    /// Command or three-digit numeric, upper-cased.
    pub command: String,
    /// Parameters; the trailing one has its `:` removed.
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse a single line. Returns `None` if there is no command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        if rest.starts_with('@') {
            rest = rest.split_once(' ').map(|(_, r)| r)?;
        }
        rest = rest.trim_start_matches(' ');

        let prefix = match rest.strip_prefix(':') {
            Some(stripped) => {
                let (prefix, r) = stripped.split_once(' ')?;
                rest = r;
                Some(prefix.to_string())
            }
            None => None,
        };

        let mut params = Vec::new();
        let (command, mut rest) = match rest.trim_start_matches(' ').split_once(' ') {
            Some((command, r)) => (command, r),
            None => (rest.trim_start_matches(' '), ""),
        };
        if command.is_empty() {
            return None;
        }

        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, r)) => {
                    params.push(param.to_string());
                    rest = r;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick part of the prefix (`nick!user@host`).
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split(['!', '@']).next().unwrap_or(prefix))
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The last parameter, which carries free text for most commands.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

/// Text of a PRIVMSG, with CTCP ACTION unwrapped.
///
/// Returns `(text, is_action)`, or `None` for other CTCP requests.
pub fn unwrap_ctcp(text: &str) -> Option<(&str, bool)> {
    let Some(inner) = text.strip_prefix(CTCP_DELIM) else {
        return Some((text, false));
    };
    let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
    let action = inner.strip_prefix("ACTION")?;
    Some((action.strip_prefix(' ').unwrap_or(action), true))
}

/// Build `PRIVMSG <target> :<text>` that fits in one IRC line.
///
/// Line breaks become spaces and NUL bytes are dropped; the text is cut on
/// a character boundary when the whole line would exceed the limit.
pub fn privmsg(target: &str, text: &str) -> String {
    let head = format!("PRIVMSG {} :", target);
    let room = MAX_LINE_BYTES.saturating_sub(head.len());

    let mut body = String::with_capacity(text.len().min(room));
    for ch in text.chars() {
        let ch = match ch {
            '\r' | '\n' => ' ',
            '\0' => continue,
            c => c,
        };
        if body.len() + ch.len_utf8() > room {
            break;
        }
        body.push(ch);
    }

    head + &body
}

/// Nick to try after `nick` was refused as in use.
pub fn alternate_nick(nick: &str) -> String {
    format!("{}_", nick)
}
