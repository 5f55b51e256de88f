// Inbound message queue shared between the backend's message listener
// (producer) and the REPL (consumer).

use crate::backend::Message;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What happened to an offered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queued after evicting the oldest entry.
    QueuedDroppingOldest,
    /// Sender is not the current target.
    Ignored,
}

/// FIFO of messages from the current chat target.
///
/// The target and the queue sit under one lock, so a message is checked and
/// enqueued atomically with respect to [`Inbox::retarget`]. When full, the
/// oldest message is dropped.
pub struct Inbox {
    capacity: usize,
    state: Mutex<State>,
}

struct State {
    target: String,
    queue: VecDeque<Message>,
}

impl Inbox {
    pub fn new(target: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Inbox {
            capacity,
            state: Mutex::new(State {
                target: target.into(),
                queue: VecDeque::with_capacity(capacity.min(64)),
            }),
        }
    }

    pub fn offer(&self, message: &Message) -> Delivery {
        let mut state = self.lock();
        if message.sender_id != state.target {
            return Delivery::Ignored;
        }
        let mut delivery = Delivery::Queued;
        if state.queue.len() >= self.capacity {
            state.queue.pop_front();
            delivery = Delivery::QueuedDroppingOldest;
        }
        state.queue.push_back(message.clone());
        delivery
    }

    /// Switch to a new target. Anything still queued belonged to the old
    /// target and is discarded.
    pub fn retarget(&self, target: impl Into<String>) {
        let mut state = self.lock();
        state.target = target.into();
        state.queue.clear();
    }

    pub fn target(&self) -> String {
        self.lock().target.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Take every queued message, oldest first.
    pub fn drain(&self) -> Vec<Message> {
        self.lock().queue.drain(..).collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
