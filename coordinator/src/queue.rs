//! FIFO queue of clients looking for a match

use std::collections::VecDeque;

/// Identifier the coordinator assigns to each control connection
pub type ClientId = u32;

#[derive(Debug, Default)]
pub struct SearchQueue {
    queue: VecDeque<ClientId>,
}

impl SearchQueue {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Adds a client to the back of the queue. Returns false if it was already waiting.
    pub fn enqueue(&mut self, client_id: ClientId) -> bool {
        if self.contains(client_id) {
            return false;
        }
        self.queue.push_back(client_id);
        true
    }

    pub fn remove(&mut self, client_id: ClientId) -> bool {
        match self.queue.iter().position(|id| *id == client_id) {
            Some(pos) => self.queue.remove(pos).is_some(),
            None => false,
        }
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.queue.contains(&client_id)
    }

    /// Takes the two longest-waiting clients, oldest first
    pub fn pop_pair(&mut self) -> Option<(ClientId, ClientId)> {
        if self.queue.len() < 2 {
            return None;
        }
        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        Some((first, second))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientId> {
        self.queue.iter()
    }
}
