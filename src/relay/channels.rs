//! Relay channel management.
//!
//! Groups the channels that connect the IRC session, the Discord side and
//! the router.

use tokio::sync::{mpsc, watch};

use crate::common::{DiscordAction, OutboundLine, RelayEvent};

/// Channels for the IRC session.
pub struct IrcChannels {
    /// Lines the router wants sent.
    pub outbound_rx: mpsc::UnboundedReceiver<OutboundLine>,
    /// Events for the router.
    pub events_tx: mpsc::UnboundedSender<RelayEvent>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Channels for the Discord client and outbox.
pub struct DiscordSideChannels {
    /// Messages and state changes for the router.
    pub events_tx: mpsc::UnboundedSender<RelayEvent>,
    /// Posts and built-in commands produced by the router.
    pub actions_rx: mpsc::UnboundedReceiver<DiscordAction>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Channels for the router task.
pub struct RouterChannels {
    pub events_rx: mpsc::UnboundedReceiver<RelayEvent>,
    pub irc_tx: mpsc::UnboundedSender<OutboundLine>,
    pub discord_tx: mpsc::UnboundedSender<DiscordAction>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Control channels for shutdown coordination.
pub struct ControlChannels {
    /// Sender to trigger shutdown.
    pub shutdown_tx: watch::Sender<bool>,
}

/// Resolves once shutdown has been requested or the sender is gone.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Bundle of all channels used by the relay.
pub struct ChannelBundle {
    pub irc: IrcChannels,
    pub discord: DiscordSideChannels,
    pub router: RouterChannels,
    pub control: ControlChannels,
}

impl ChannelBundle {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (irc_tx, outbound_rx) = mpsc::unbounded_channel();
        let (discord_tx, actions_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            irc: IrcChannels {
                outbound_rx,
                events_tx: events_tx.clone(),
                shutdown_rx: shutdown_rx.clone(),
            },
            discord: DiscordSideChannels {
                events_tx,
                actions_rx,
                shutdown_rx: shutdown_rx.clone(),
            },
            router: RouterChannels {
                events_rx,
                irc_tx,
                discord_tx,
                shutdown_rx,
            },
            control: ControlChannels { shutdown_tx },
        }
    }
}

impl Default for ChannelBundle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ConnectionState, IrcEvent};

    #[test]
    fn test_bundle_is_wired() {
        let mut bundle = ChannelBundle::new();

        bundle
            .irc
            .events_tx
            .send(RelayEvent::Irc(IrcEvent::State(ConnectionState::Ready)))
            .unwrap();
        bundle
            .discord
            .events_tx
            .send(RelayEvent::DiscordState(ConnectionState::Connecting))
            .unwrap();
        assert!(matches!(
            bundle.router.events_rx.try_recv().unwrap(),
            RelayEvent::Irc(IrcEvent::State(ConnectionState::Ready))
        ));
        assert!(matches!(
            bundle.router.events_rx.try_recv().unwrap(),
            RelayEvent::DiscordState(ConnectionState::Connecting)
        ));

        bundle
            .router
            .irc_tx
            .send(OutboundLine {
                request_id: None,
                target: "Sequell".to_string(),
                text: "!lg".to_string(),
            })
            .unwrap();
        assert_eq!(bundle.irc.outbound_rx.try_recv().unwrap().target, "Sequell");

        bundle.control.shutdown_tx.send(true).unwrap();
        assert!(*bundle.discord.shutdown_rx.borrow());
        assert!(*bundle.router.shutdown_rx.borrow());
    }
}
