//! Rendering of IRC bot replies for Discord.

/// Discord's per-message limit. Splitting counts bytes, which never exceeds
/// the character count.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

const CODE_FENCE: &str = "```";

/// How a bot reply is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStyle {
    Normal,
    /// CTCP ACTION, shown in italics.
    Action,
    /// Fixed-width block for bots with tabular output.
    CodeBlock,
}

/// A reply ready to be split and posted.
#[derive(Debug, Clone)]
pub struct Reply<'a> {
    pub text: &'a str,
    pub style: ReplyStyle,
    /// User to mention in front of the reply.
    pub mention: Option<u64>,
    /// The text would itself trigger a bot and must be defused.
    pub needs_escape: bool,
}

impl Reply<'_> {
    /// Render into one or more Discord messages, each within the limit.
    pub fn render(&self) -> Vec<String> {
        let text = strip_irc_formatting(self.text);
        let prefix = self
            .mention
            .map(|id| format!("<@{}> ", id))
            .unwrap_or_default();

        let (open, close, body) = match self.style {
            ReplyStyle::CodeBlock => (CODE_FENCE, CODE_FENCE, text.replace(CODE_FENCE, "'''")),
            ReplyStyle::Action => ("_", "_", escape_discord_markdown(&text)),
            ReplyStyle::Normal if self.needs_escape => ("]", "", escape_discord_markdown(&text)),
            ReplyStyle::Normal => ("", "", escape_discord_markdown(&text)),
        };

        let room = DISCORD_MESSAGE_LIMIT.saturating_sub(prefix.len() + open.len() + close.len());
        split_message(&body, room.max(1))
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let lead = if i == 0 { prefix.as_str() } else { "" };
                format!("{}{}{}{}", lead, open, chunk, close)
            })
            .collect()
    }
}

/// Remove mIRC formatting: bold, italics, underline, reverse, reset,
/// monospace, strikethrough and colour codes.
pub fn strip_irc_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\x02' | '\x0F' | '\x11' | '\x16' | '\x1D' | '\x1E' | '\x1F' => {}
            '\x03' => skip_color(&mut chars, |c| c.is_ascii_digit(), 2),
            '\x04' => skip_color(&mut chars, |c| c.is_ascii_hexdigit(), 6),
            _ => out.push(ch),
        }
    }

    out
}

type CharStream<'a> = std::iter::Peekable<std::str::Chars<'a>>;

/// Skip `fg[,bg]` after a colour control character.
fn skip_color(chars: &mut CharStream<'_>, is_digit: fn(&char) -> bool, width: usize) {
    if skip_up_to(chars, is_digit, width) == 0 {
        return;
    }
    if chars.peek() == Some(&',') {
        let mut lookahead = chars.clone();
        lookahead.next();
        if lookahead.peek().is_some_and(is_digit) {
            chars.next();
            skip_up_to(chars, is_digit, width);
        }
    }
}

fn skip_up_to(chars: &mut CharStream<'_>, pred: fn(&char) -> bool, max: usize) -> usize {
    let mut skipped = 0;
    while skipped < max && chars.next_if(pred).is_some() {
        skipped += 1;
    }
    skipped
}

/// Escape Discord markdown special characters.
pub fn escape_discord_markdown(message: &str) -> String {
    message
        .replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace('*', "\\*")
        .replace('_', "\\_")
        .replace('~', "\\~")
        .replace('|', "\\|")
}

/// Find the last UTF-8 char boundary at or before `byte_index` in `s`.
fn floor_char_boundary(s: &str, byte_index: usize) -> usize {
    if byte_index >= s.len() {
        return s.len();
    }
    let mut i = byte_index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split a message into chunks of at most `max_len` bytes.
///
/// Prefers line breaks, then spaces. Never splits inside a UTF-8 character.
pub fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let split_at = floor_char_boundary(remaining, max_len);

        // A single character wider than max_len still has to go somewhere.
        if split_at == 0 {
            let first_char_end = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
            chunks.push(remaining[..first_char_end].to_string());
            remaining = &remaining[first_char_end..];
            continue;
        }

        let chunk = &remaining[..split_at];
        match chunk.rfind('\n').or_else(|| chunk.rfind(' ')) {
            Some(idx) if idx > 0 => {
                chunks.push(remaining[..idx].to_string());
                remaining = &remaining[idx + 1..];
            }
            _ => {
                chunks.push(chunk.to_string());
                remaining = &remaining[split_at..];
            }
        }
    }

    chunks
}
