//! Bounded outbound queue.

use std::collections::VecDeque;

use crate::common::OutboundLine;

/// FIFO of lines waiting to be sent. When full, the oldest line is dropped
/// to make room.
#[derive(Debug)]
pub struct OutboundQueue {
    lines: VecDeque<OutboundLine>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, returning the line evicted to make room.
    pub fn push(&mut self, line: OutboundLine) -> Option<OutboundLine> {
        let evicted = if self.lines.len() >= self.capacity {
            self.lines.pop_front()
        } else {
            None
        };
        self.lines.push_back(line);
        evicted
    }

    pub fn front(&self) -> Option<&OutboundLine> {
        self.lines.front()
    }

    pub fn pop_front(&mut self) -> Option<OutboundLine> {
        self.lines.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RequestId;

    fn line(id: RequestId) -> OutboundLine {
        OutboundLine {
            request_id: Some(id),
            target: "Sequell".to_string(),
            text: format!("!lg r{}", id),
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = OutboundQueue::new(4);
        queue.push(line(1));
        queue.push(line(2));
        assert_eq!(queue.front().unwrap().request_id, Some(1));
        assert_eq!(queue.pop_front().unwrap().request_id, Some(1));
        assert_eq!(queue.pop_front().unwrap().request_id, Some(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = OutboundQueue::new(2);
        assert!(queue.push(line(1)).is_none());
        assert!(queue.push(line(2)).is_none());
        let evicted = queue.push(line(3)).unwrap();
        assert_eq!(evicted.request_id, Some(1));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_front().unwrap().request_id, Some(2));
        assert_eq!(queue.pop_front().unwrap().request_id, Some(3));
    }
}
