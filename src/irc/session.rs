//! IRC session: connect, register, relay lines and reconnect with backoff.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::common::error::{ConnectionError, SessionResult};
use crate::common::{Backend, ConnectionState, IrcEvent, OutboundLine, RelayEvent, StateTracker};
use crate::config::relay::IrcSettings;
use crate::irc::codec::{new_irc_connection, IrcConnection};
use crate::irc::message::{privmsg, unwrap_ctcp, IrcMessage};
use crate::irc::queue::OutboundQueue;
use crate::irc::registration::Registration;
use crate::irc::tls;
use crate::relay::channels::{shutdown_requested, IrcChannels};

/// Silence after which we ping the server ourselves.
const KEEPALIVE_IDLE: Duration = Duration::from_secs(120);
/// Silence after which the link is considered dead.
const DEAD_LINK: Duration = Duration::from_secs(240);
const KEEPALIVE_CHECK: Duration = Duration::from_secs(10);

const QUIT_MESSAGE: &str = "QUIT :Shutting down";

#[derive(Debug, PartialEq, Eq)]
enum Keepalive {
    Idle,
    Ping,
    Dead,
}

fn keepalive_action(silence: Duration, ping_sent: bool) -> Keepalive {
    if silence >= DEAD_LINK {
        Keepalive::Dead
    } else if silence >= KEEPALIVE_IDLE && !ping_sent {
        Keepalive::Ping
    } else {
        Keepalive::Idle
    }
}

pub struct IrcSession {
    settings: IrcSettings,
    channels: IrcChannels,
    state: StateTracker,
    queue: OutboundQueue,
}

impl IrcSession {
    pub fn new(settings: IrcSettings, channels: IrcChannels) -> Self {
        let queue = OutboundQueue::new(settings.queue_size);
        Self {
            settings,
            channels,
            state: StateTracker::new(Backend::Irc),
            queue,
        }
    }

    /// Keep a connection up until shutdown. Returns an error only for
    /// failures that must not be retried.
    pub async fn run(mut self) -> SessionResult<()> {
        let policy = self.settings.reconnect.clone();
        let mut backoff = policy.backoff();
        let mut shutdown_rx = self.channels.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            info!(
                host = %self.settings.hostname,
                port = self.settings.port,
                tls = self.settings.use_ssl,
                "Connecting to IRC server"
            );

            let connect = tls::connect(&self.settings.hostname, self.settings.port, self.settings.use_ssl);
            let result = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown_rx) => break,
                stream = connect => match stream {
                    Ok(stream) => self.run_connection(new_irc_connection(stream)).await,
                    Err(e) => Err(e.into()),
                },
            };

            match result {
                Ok(()) => break,
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "IRC session cannot continue");
                    self.set_state(ConnectionState::Disconnected);
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "IRC connection lost"),
            }

            if self.state.get().is_ready() {
                backoff = policy.backoff();
            }
            self.emit(IrcEvent::Disconnected);

            let delay = policy.next_delay(&mut backoff);
            info!("Reconnecting in {:.1} seconds...", delay.as_secs_f64());
            self.set_state(ConnectionState::Reconnecting(delay));
            if self.wait_backoff(delay).await {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("IRC session stopped");
        Ok(())
    }

    /// Sleep out a backoff while still accepting outbound lines.
    /// Returns true if shutdown was requested.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let mut shutdown_rx = self.channels.shutdown_rx.clone();
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown_rx) => {
                    info!("Shutdown signal received during backoff");
                    return true;
                }
                _ = &mut sleep => return false,
                Some(line) = self.channels.outbound_rx.recv() => self.enqueue(line),
            }
        }
    }

    /// Drive one established connection. `Ok` means a clean shutdown.
    async fn run_connection<S>(&mut self, mut connection: IrcConnection<S>) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut registration = Registration::new(&self.settings.nick, self.settings.sasl.clone());
        let mut shutdown_rx = self.channels.shutdown_rx.clone();

        self.set_state(ConnectionState::Authenticating);
        for line in registration.start() {
            connection.send(line).await?;
        }

        let mut pacer = tokio::time::interval(self.settings.send_interval);
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut keepalive = tokio::time::interval(KEEPALIVE_CHECK);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_seen = Instant::now();
        let mut ping_sent = false;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown_rx) => {
                    self.quit(&mut connection, registration.is_registered()).await;
                    return Ok(());
                }

                frame = connection.next() => {
                    let line = match frame {
                        Some(Ok(line)) => line,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(ConnectionError::ConnectionClosed.into()),
                    };
                    last_seen = Instant::now();
                    ping_sent = false;
                    self.handle_line(&mut connection, &mut registration, &line).await?;
                }

                Some(line) = self.channels.outbound_rx.recv() => self.enqueue(line),

                _ = pacer.tick(), if registration.is_registered() && !self.queue.is_empty() => {
                    self.send_next(&mut connection).await?;
                }

                _ = keepalive.tick() => {
                    match keepalive_action(last_seen.elapsed(), ping_sent) {
                        Keepalive::Idle => {}
                        Keepalive::Ping => {
                            debug!("Link idle, sending keepalive PING");
                            connection.send(format!("PING :{}", self.settings.hostname)).await?;
                            ping_sent = true;
                        }
                        Keepalive::Dead => {
                            warn!(silence_secs = last_seen.elapsed().as_secs(), "No data from IRC server");
                            return Err(ConnectionError::Timeout.into());
                        }
                    }
                }
            }
        }
    }

    async fn handle_line<S>(
        &mut self,
        connection: &mut IrcConnection<S>,
        registration: &mut Registration,
        line: &str,
    ) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(msg) = IrcMessage::parse(line) else {
            debug!(line = %line, "Unparseable IRC line");
            return Ok(());
        };

        match msg.command.as_str() {
            "PING" => {
                connection
                    .send(format!("PONG :{}", msg.trailing().unwrap_or_default()))
                    .await?;
            }
            "PONG" => {}
            "ERROR" => {
                return Err(ConnectionError::ServerError {
                    reason: msg.trailing().unwrap_or_default().to_string(),
                }
                .into());
            }
            "PRIVMSG" | "NOTICE" if registration.is_registered() => {
                self.on_private_message(&msg, registration.nick());
            }
            _ => {
                let was_registered = registration.is_registered();
                for reply in registration.handle(&msg)? {
                    connection.send(reply).await?;
                }
                if !was_registered && registration.is_registered() {
                    self.set_state(ConnectionState::Ready);
                    if !self.queue.is_empty() {
                        info!(queued = self.queue.len(), "Flushing queued IRC lines");
                    }
                }
            }
        }
        Ok(())
    }

    /// Forward a PRIVMSG or NOTICE addressed to our nick.
    fn on_private_message(&self, msg: &IrcMessage, own_nick: &str) {
        let (Some(nick), Some(target), Some(text)) = (msg.nick(), msg.param(0), msg.trailing()) else {
            return;
        };
        if !target.eq_ignore_ascii_case(own_nick) {
            return;
        }
        let Some((text, action)) = unwrap_ctcp(text) else {
            debug!(nick = %nick, "Ignoring CTCP request");
            return;
        };
        self.emit(IrcEvent::Message {
            nick: nick.to_string(),
            text: text.to_string(),
            action,
        });
    }

    fn enqueue(&mut self, line: OutboundLine) {
        if let Some(evicted) = self.queue.push(line) {
            warn!(
                bot = %evicted.target,
                request_id = ?evicted.request_id,
                "Outbound queue full, dropping oldest line"
            );
            if let Some(id) = evicted.request_id {
                self.emit(IrcEvent::Dropped(id));
            }
        }
    }

    /// Send the oldest queued line. It leaves the queue only once written.
    async fn send_next<S>(&mut self, connection: &mut IrcConnection<S>) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(line) = self.queue.front() else {
            return Ok(());
        };
        connection.send(privmsg(&line.target, &line.text)).await?;
        if let Some(sent) = self.queue.pop_front() {
            debug!(bot = %sent.target, request_id = ?sent.request_id, "Sent IRC line");
            if let Some(id) = sent.request_id {
                self.emit(IrcEvent::Sent(id));
            }
        }
        Ok(())
    }

    /// Flush what is queued and say goodbye. Errors only get logged here.
    async fn quit<S>(&mut self, connection: &mut IrcConnection<S>, registered: bool)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if registered {
            while let Some(line) = self.queue.pop_front() {
                if let Err(e) = connection.send(privmsg(&line.target, &line.text)).await {
                    debug!(error = %e, "Failed to flush queued line on shutdown");
                    return;
                }
                if let Some(id) = line.request_id {
                    self.emit(IrcEvent::Sent(id));
                }
            }
        }
        if let Err(e) = connection.send(QUIT_MESSAGE.to_string()).await {
            debug!(error = %e, "Failed to send QUIT");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.set(state);
        self.emit(IrcEvent::State(state));
    }

    fn emit(&self, event: IrcEvent) {
        if let Err(e) = self.channels.events_tx.send(RelayEvent::Irc(event)) {
            debug!("Router channel closed: {}", e);
        }
    }
}
