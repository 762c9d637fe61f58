//! In-flight request tracking.
//!
//! IRC bots give no request identifiers of their own, so replies are matched
//! to requests in FIFO order per bot. Bots that echo a relay token are matched
//! by request ID instead. FIFO matching assumes a bot answers in the order it
//! was asked; a bot that reorders replies would cross them.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::common::RequestId;

/// A command sent to IRC that is waiting for its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: RequestId,
    /// Discord channel the reply goes to.
    pub channel_id: u64,
    pub user_id: u64,
    pub user_name: String,
    /// Nick of the bot the command went to.
    pub bot: String,
    pub submitted: Instant,
    pub deadline: Instant,
    /// Written to the current IRC connection.
    pub sent: bool,
}

impl PendingRequest {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Result of looking up the request a reply belongs to.
#[derive(Debug, Default)]
pub struct Correlation {
    /// The matching live request, if any.
    pub request: Option<PendingRequest>,
    /// Requests discovered to be past their deadline during the lookup.
    pub expired: Vec<PendingRequest>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Per-bot queues keyed by lowercase nick, oldest first.
    by_bot: HashMap<String, VecDeque<PendingRequest>>,
}

impl Inner {
    fn queue(&mut self, bot: &str) -> Option<&mut VecDeque<PendingRequest>> {
        self.by_bot.get_mut(&bot.to_ascii_lowercase())
    }

    fn drain_matching(&mut self, mut pred: impl FnMut(&PendingRequest) -> bool) -> Vec<PendingRequest> {
        let mut drained = Vec::new();
        for queue in self.by_bot.values_mut() {
            let mut kept = VecDeque::with_capacity(queue.len());
            for request in queue.drain(..) {
                if pred(&request) {
                    drained.push(request);
                } else {
                    kept.push_back(request);
                }
            }
            *queue = kept;
        }
        self.by_bot.retain(|_, queue| !queue.is_empty());
        drained.sort_by_key(|r| r.id);
        drained
    }
}

/// Table of pending requests.
///
/// All access goes through one mutex held only for the table operation
/// itself, never across an await.
#[derive(Debug, Clone, Default)]
pub struct PendingTable {
    inner: Arc<Mutex<Inner>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request: PendingRequest) {
        let key = request.bot.to_ascii_lowercase();
        self.inner.lock().by_bot.entry(key).or_default().push_back(request);
    }

    /// Oldest live request for `bot`. Expired requests ahead of it are removed.
    pub fn pop_oldest(&self, bot: &str, now: Instant) -> Correlation {
        let mut inner = self.inner.lock();
        let mut correlation = Correlation::default();
        if let Some(queue) = inner.queue(bot) {
            while let Some(request) = queue.pop_front() {
                if request.is_expired(now) {
                    correlation.expired.push(request);
                } else {
                    correlation.request = Some(request);
                    break;
                }
            }
        }
        correlation
    }

    /// The request with `id` sent to `bot`, if it is still live.
    pub fn take(&self, bot: &str, id: RequestId, now: Instant) -> Correlation {
        let mut inner = self.inner.lock();
        let mut correlation = Correlation::default();
        if let Some(queue) = inner.queue(bot) {
            if let Some(pos) = queue.iter().position(|r| r.id == id) {
                if let Some(request) = queue.remove(pos) {
                    if request.is_expired(now) {
                        correlation.expired.push(request);
                    } else {
                        correlation.request = Some(request);
                    }
                }
            }
        }
        correlation
    }

    /// Remove a single request regardless of state.
    pub fn remove(&self, id: RequestId) -> Option<PendingRequest> {
        self.inner.lock().drain_matching(|r| r.id == id).pop()
    }

    /// Remove every request past its deadline.
    pub fn expire(&self, now: Instant) -> Vec<PendingRequest> {
        self.inner.lock().drain_matching(|r| r.is_expired(now))
    }

    /// Record that the line for `id` went out. False if the request is gone.
    pub fn mark_sent(&self, id: RequestId) -> bool {
        let mut inner = self.inner.lock();
        for queue in inner.by_bot.values_mut() {
            if let Some(request) = queue.iter_mut().find(|r| r.id == id) {
                request.sent = true;
                return true;
            }
        }
        false
    }

    /// Remove every request that was sent on a link that has since dropped.
    /// Requests never sent stay, in order, for the next connection.
    pub fn flush_sent(&self) -> Vec<PendingRequest> {
        self.inner.lock().drain_matching(|r| r.sent)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_bot.values().map(VecDeque::len).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
