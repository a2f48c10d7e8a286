//! Per-link forwarding state
//!
//! A [`LinkRecord`] exists for every outgoing link bound to an address. Its
//! queue is strictly FIFO: insertion order is transmission order.

use std::collections::VecDeque;

use switchyard_core::{DeliveryRef, HashKey, LinkId, LinkRef, Message};

/// The inbound side of a forwarded message
///
/// Present while the upstream delivery is unsettled; its settlement is
/// driven by the downstream delivery the message is eventually sent on.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub delivery: DeliveryRef,
    pub link: LinkRef,
}

impl Upstream {
    pub fn new(delivery: DeliveryRef, link: LinkRef) -> Self {
        Self { delivery, link }
    }
}

/// A message copy waiting for transmission
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message: Message,
    /// `None` if the message was pre-settled upstream
    pub upstream: Option<Upstream>,
}

/// Forwarding state of one outgoing link
#[derive(Debug)]
pub struct LinkRecord {
    link: LinkRef,
    hash_key: HashKey,
    out_queue: VecDeque<QueuedMessage>,
}

impl LinkRecord {
    pub fn new(link: LinkRef, hash_key: HashKey) -> Self {
        Self {
            link,
            hash_key,
            out_queue: VecDeque::new(),
        }
    }

    pub fn id(&self) -> LinkId {
        self.link.id()
    }

    pub fn link(&self) -> &LinkRef {
        &self.link
    }

    /// Key of the address this link consumes from
    pub fn hash_key(&self) -> &HashKey {
        &self.hash_key
    }

    /// Number of queued messages
    pub fn depth(&self) -> usize {
        self.out_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out_queue.is_empty()
    }

    /// Whether the queue has reached `limit`
    pub fn is_full(&self, limit: Option<usize>) -> bool {
        limit.is_some_and(|max| self.out_queue.len() >= max)
    }

    pub fn push(&mut self, queued: QueuedMessage) {
        self.out_queue.push_back(queued);
    }

    pub fn pop(&mut self) -> Option<QueuedMessage> {
        self.out_queue.pop_front()
    }

    /// Return a popped message to the head of the queue
    pub fn push_front(&mut self, queued: QueuedMessage) {
        self.out_queue.push_front(queued);
    }

    /// Remove every queued message, oldest first
    pub fn drain(&mut self) -> Vec<QueuedMessage> {
        self.out_queue.drain(..).collect()
    }
}
