//! The network seam: how a participant sends messages to the rest of the
//! set, and the in-memory test double scenario tests drive against.

use {crate::types::Message, std::collections::VecDeque};

/// Delivers wire-encoded messages to other participants.
pub trait Transport: Send + Sync {
    /// Send `msg` to a single participant.
    fn send(&mut self, to: u32, msg: &Message);

    /// Send `msg` to every other participant. Does not also deliver to the
    /// sender — callers that want self-delivery (most IBFT implementations
    /// process their own broadcast messages through the same path as a
    /// peer's) must call `deliver` on the sender's own participant after
    /// broadcasting.
    fn broadcast(&mut self, msg: &Message);
}

/// A test double: an in-process network of queues, one per participant,
/// with no serialization — [`Message`] is cloned directly. Useful for
/// scenario tests that drive several participants against each other inside
/// a single process.
pub struct InMemoryNetwork {
    queues: Vec<VecDeque<Message>>,
    sender: u32,
}

impl InMemoryNetwork {
    /// Create a network view for `sender` among `n` participants.
    pub fn new(n: usize, sender: u32) -> Self {
        Self {
            queues: (0..n).map(|_| VecDeque::new()).collect(),
            sender,
        }
    }

    /// Pop the next message queued for `participant`, if any.
    pub fn pop(&mut self, participant: u32) -> Option<Message> {
        self.queues.get_mut(participant as usize)?.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty())
    }
}

impl Transport for InMemoryNetwork {
    fn send(&mut self, to: u32, msg: &Message) {
        if let Some(queue) = self.queues.get_mut(to as usize) {
            queue.push_back(msg.clone());
        }
    }

    fn broadcast(&mut self, msg: &Message) {
        for (id, queue) in self.queues.iter_mut().enumerate() {
            if id as u32 != self.sender {
                queue.push_back(msg.clone());
            }
        }
    }
}
