//! Relay router that ties Discord and IRC together.
//!
//! Runs as a single task. Every inbound Discord message and every IRC event
//! passes through here, so the router is the only place where requests are
//! created, correlated and expired.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::common::{
    ConnectionState, DiscordAction, InboundMessage, IrcEvent, OutboundLine, RelayEvent, RequestId,
};
use crate::config::RelayConfig;
use crate::relay::access::{AccessControl, Denial, Permit, Permitted};
use crate::relay::commands::{self, BuiltinCommand, Invocation, ParsedCommand};
use crate::relay::formatter::{Reply, ReplyStyle};
use crate::relay::limiter::{Admission, RateLimiter};
use crate::relay::matcher::{BotTarget, PatternMatcher};
use crate::relay::pending::{Correlation, PendingRequest, PendingTable};

/// How often expired requests and idle rate windows are cleaned up.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// What happened to an inbound Discord message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Not a command for any bot.
    Ignored,
    Denied(Denial),
    /// Dropped by the rate limiter.
    Limited(Duration),
    /// Sent (or queued) to an IRC bot.
    Relayed { request_id: RequestId, bot: String },
    /// Handled as a built-in command.
    Builtin(BuiltinCommand),
}

/// Wrap a command in a Sequell `!RELAY` so the reply carries our request ID.
pub fn relay_token_line(id: RequestId, requester: &str, command: &str) -> String {
    let nick: String = requester
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("!RELAY -n 1 -nick {} -prefix r{}: {}", nick, id, command)
}

/// Split a `r<id>:` relay token off a reply.
pub fn parse_relay_token(line: &str) -> Option<(RequestId, &str)> {
    let (token, rest) = line.strip_prefix('r')?.split_once(':')?;
    let id = token.parse().ok()?;
    Some((id, rest.trim_start()))
}

/// The relay router.
pub struct Router {
    matcher: PatternMatcher,
    access: AccessControl,
    limiter: RateLimiter,
    pending: PendingTable,
    request_timeout: Duration,
    mention_requester: bool,
    next_id: RequestId,
    irc_state: ConnectionState,
    discord_state: ConnectionState,
    irc_tx: mpsc::UnboundedSender<OutboundLine>,
    discord_tx: mpsc::UnboundedSender<DiscordAction>,
}

impl Router {
    pub fn new(
        config: &RelayConfig,
        irc_tx: mpsc::UnboundedSender<OutboundLine>,
        discord_tx: mpsc::UnboundedSender<DiscordAction>,
    ) -> Self {
        let discord = &config.discord;
        Self {
            matcher: PatternMatcher::new(config.bots.clone()),
            access: AccessControl::new(
                config.bad_patterns.clone(),
                discord.admins.iter().copied(),
                discord.ignored.iter().copied(),
            ),
            limiter: RateLimiter::new(
                discord.command_limit,
                discord.command_period,
                discord.user_command_limit,
            ),
            pending: PendingTable::new(),
            request_timeout: discord.request_timeout,
            mention_requester: discord.mention_requester,
            next_id: 1,
            irc_state: ConnectionState::Disconnected,
            discord_state: ConnectionState::Disconnected,
            irc_tx,
            discord_tx,
        }
    }

    /// Process events until the channel closes or shutdown is signalled.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<RelayEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Relay router started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event, Instant::now()),
                    None => break,
                },
                _ = sweep.tick() => self.sweep(Instant::now()),
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!(pending = self.pending_len(), "Relay router stopped");
    }

    pub fn handle(&mut self, event: RelayEvent, now: Instant) {
        match event {
            RelayEvent::Discord(msg) => {
                self.on_discord_message(msg, now);
            }
            RelayEvent::DiscordState(state) => self.discord_state = state,
            RelayEvent::Irc(event) => self.on_irc_event(event, now),
        }
    }

    /// Route one Discord message.
    pub fn on_discord_message(&mut self, msg: InboundMessage, now: Instant) -> Dispatch {
        match self.access.permit(&msg) {
            Permit::Denied(denial) => {
                if let Some(notice) = denial.notice() {
                    self.post(msg.channel_id, notice);
                }
                Dispatch::Denied(denial)
            }
            Permit::Allowed(Permitted::Builtin(parsed)) => self.run_builtin(&msg, parsed, now),
            Permit::Allowed(Permitted::Text) => self.relay(&msg, now),
        }
    }

    fn relay(&mut self, msg: &InboundMessage, now: Instant) -> Dispatch {
        let Some(hit) = self.matcher.classify(&msg.content) else {
            return Dispatch::Ignored;
        };
        debug!(bot = %hit.bot.nick, category = hit.category, "Message classified");
        let (bot, relay_tokens) = (hit.bot.nick.clone(), hit.bot.relay_tokens);

        if let Some(dispatch) = self.check_limit(msg, now) {
            return dispatch;
        }

        let id = self.next_id;
        self.next_id += 1;

        let text = if relay_tokens {
            relay_token_line(id, &msg.user_name, &msg.content)
        } else {
            msg.content.clone()
        };

        self.pending.insert(PendingRequest {
            id,
            channel_id: msg.channel_id,
            user_id: msg.user_id,
            user_name: msg.user_name.clone(),
            bot: bot.clone(),
            submitted: now,
            deadline: now + self.request_timeout,
            sent: false,
        });

        let line = OutboundLine {
            request_id: Some(id),
            target: bot.clone(),
            text,
        };
        if self.irc_tx.send(line).is_err() {
            warn!(request_id = id, "IRC session is gone, dropping request");
            self.pending.remove(id);
            return Dispatch::Ignored;
        }

        info!(
            request_id = id,
            user = msg.user_id,
            bot = %bot,
            "Discord -> IRC: {}",
            msg.content
        );
        Dispatch::Relayed { request_id: id, bot }
    }

    fn run_builtin(&mut self, msg: &InboundMessage, parsed: ParsedCommand, now: Instant) -> Dispatch {
        let command = parsed.command;
        if let Some(dispatch) = self.check_limit(msg, now) {
            return dispatch;
        }

        info!(user = msg.user_id, command = command.name(), "Running built-in command");
        match command {
            BuiltinCommand::BotHelp => self.post(msg.channel_id, commands::help_text()),
            BuiltinCommand::Version => self.post(
                msg.channel_id,
                format!("Version {}", env!("CARGO_PKG_VERSION")),
            ),
            BuiltinCommand::Status => {
                let status = self.status_text();
                self.post(msg.channel_id, status);
            }
            _ => {
                let invocation = Invocation {
                    command,
                    channel_id: msg.channel_id,
                    guild_id: msg.guild_id,
                    user_id: msg.user_id,
                    user_name: msg.user_name.clone(),
                    subject_id: parsed.target.unwrap_or(msg.user_id),
                    argument: parsed.argument,
                };
                if self.discord_tx.send(DiscordAction::Builtin(invocation)).is_err() {
                    warn!("Discord outbox is gone, dropping built-in command");
                }
            }
        }
        Dispatch::Builtin(command)
    }

    fn check_limit(&self, msg: &InboundMessage, now: Instant) -> Option<Dispatch> {
        match self.limiter.admit_user(msg.user_id, now) {
            Admission::Admitted => None,
            Admission::Rejected(retry_after) => {
                info!(
                    user = msg.user_id,
                    channel = msg.channel_id,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Command ignored due to command limit: {}",
                    msg.content
                );
                Some(Dispatch::Limited(retry_after))
            }
        }
    }

    /// React to something the IRC session reported.
    pub fn on_irc_event(&mut self, event: IrcEvent, now: Instant) {
        match event {
            IrcEvent::State(state) => self.irc_state = state,
            IrcEvent::Message { nick, text, action } => self.on_irc_line(&nick, &text, action, now),
            IrcEvent::Sent(id) => {
                if !self.pending.mark_sent(id) {
                    debug!(request_id = id, "Sent line for a request that is gone");
                }
            }
            IrcEvent::Disconnected => {
                let flushed = self.pending.flush_sent();
                if !flushed.is_empty() {
                    info!(
                        flushed = flushed.len(),
                        waiting = self.pending_len(),
                        "IRC link lost, dropping requests that were already sent"
                    );
                }
            }
            IrcEvent::Dropped(id) => {
                if let Some(request) = self.pending.remove(id) {
                    warn!(
                        request_id = id,
                        bot = %request.bot,
                        "IRC queue full, request dropped"
                    );
                }
            }
        }
    }

    fn on_irc_line(&self, nick: &str, text: &str, action: bool, now: Instant) {
        let Some(bot) = self.matcher.bot_by_nick(nick) else {
            debug!(nick, "Ignoring IRC message from unknown nick: {}", text);
            return;
        };

        let (correlation, body) = self.correlate(bot, text, now);
        for request in &correlation.expired {
            debug!(
                request_id = request.id,
                bot = %bot.nick,
                "Reply arrived after the request expired"
            );
        }
        let Some(request) = correlation.request else {
            debug!(bot = %bot.nick, "No pending request for reply: {}", text);
            return;
        };

        let style = if action {
            ReplyStyle::Action
        } else if bot.code_block {
            ReplyStyle::CodeBlock
        } else {
            ReplyStyle::Normal
        };
        let reply = Reply {
            text: body,
            style,
            mention: self.mention_requester.then_some(request.user_id),
            needs_escape: self.matcher.classify(body).is_some(),
        };

        info!(
            request_id = request.id,
            bot = %bot.nick,
            channel = request.channel_id,
            "IRC -> Discord: {}",
            body
        );
        for content in reply.render() {
            self.post(request.channel_id, content);
        }
    }

    fn correlate<'a>(&self, bot: &BotTarget, text: &'a str, now: Instant) -> (Correlation, &'a str) {
        if bot.relay_tokens {
            if let Some((id, body)) = parse_relay_token(text) {
                return (self.pending.take(&bot.nick, id, now), body);
            }
            debug!(bot = %bot.nick, "Reply without relay token, falling back to arrival order");
        }
        (self.pending.pop_oldest(&bot.nick, now), text)
    }

    /// Drop expired requests and idle rate windows.
    pub fn sweep(&mut self, now: Instant) {
        for request in self.pending.expire(now) {
            info!(
                request_id = request.id,
                bot = %request.bot,
                user = request.user_id,
                "Request timed out without a reply"
            );
        }
        self.limiter.prune_idle(now);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn status_text(&self) -> String {
        format!(
            "IRC: {} | Discord: {} | Pending requests: {}",
            self.irc_state,
            self.discord_state,
            self.pending_len()
        )
    }

    fn post(&self, channel_id: u64, content: String) {
        if self
            .discord_tx
            .send(DiscordAction::Post { channel_id, content })
            .is_err()
        {
            warn!(channel = channel_id, "Discord outbox is gone, dropping message");
        }
    }
}
