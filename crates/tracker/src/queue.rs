//! Pre-init call queue — `track` calls made before `init` completes are
//! held here in order and replayed exactly once, synchronously, after
//! init's side effects are established.

use std::collections::VecDeque;

use crate::tracker::TrackOptions;

#[derive(Debug, Clone)]
pub struct QueuedCall {
    pub name: String,
    pub options: TrackOptions,
}

#[derive(Debug, Default)]
pub struct PendingCallQueue {
    calls: VecDeque<QueuedCall>,
}

impl PendingCallQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, options: TrackOptions) {
        self.calls.push_back(QueuedCall {
            name: name.into(),
            options,
        });
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Consume the queue in FIFO order. The queue is destroyed with the
    /// handle's pending state; there is no second replay.
    pub fn drain(self) -> impl Iterator<Item = QueuedCall> {
        self.calls.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = PendingCallQueue::new();
        queue.push("Signup", TrackOptions::default());
        queue.push("Purchase", TrackOptions::default());
        queue.push("pageview", TrackOptions::default());
        assert_eq!(queue.len(), 3);

        let names: Vec<String> = queue.drain().map(|c| c.name).collect();
        assert_eq!(names, vec!["Signup", "Purchase", "pageview"]);
    }
}
