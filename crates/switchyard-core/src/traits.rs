//! Core traits for Switchyard
//!
//! ## Key Traits
//!
//! - [`NodeHandler`]: Callbacks a router node exposes to the transport container
//! - [`MessageHandler`]: In-process consumer registered on an address
//! - [`NextHopForwarder`]: Strategy for handing messages to a remote router

use std::fmt::Display;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::transport::{DeliveryRef, LinkRef};

/// Result of an attach callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachOutcome {
    /// The link was opened
    Accepted,
    /// The link was closed
    Closed,
}

impl AttachOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, AttachOutcome::Accepted)
    }
}

/// Callback surface of a router node
///
/// The container invokes these from arbitrary worker threads. None of them
/// report failures back to the container beyond the attach outcome and the
/// dispositions set on deliveries.
pub trait NodeHandler: Send + Sync {
    /// A peer attached a link we receive on
    fn on_link_attach_incoming(&self, link: &LinkRef) -> AttachOutcome;

    /// A peer attached a link we send on
    fn on_link_attach_outgoing(&self, link: &LinkRef) -> AttachOutcome;

    /// Frames arrived for an inbound delivery
    fn on_message_received(&self, link: &LinkRef, delivery: &DeliveryRef);

    /// An outbound link can accept a delivery; returns whether one was sent
    fn on_link_writable(&self, link: &LinkRef) -> bool;

    /// The peer changed the state of a delivery
    fn on_disposition_changed(&self, link: &LinkRef, delivery: &DeliveryRef);

    /// A link was detached (`closed` if the peer closed it rather than detaching)
    fn on_link_detached(&self, link: &LinkRef, closed: bool);

    /// Periodic processing; returns the delay until the next call
    fn on_timer_fire(&self) -> Duration;
}

/// In-process message consumer
///
/// Invoked synchronously with the router lock held. Implementations must be
/// quick, must not call back into the router, and must clone the message if
/// they need it after returning.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, message: &Message);
}

impl<F> MessageHandler for F
where
    F: Fn(&Message) + Send + Sync,
{
    fn on_message(&self, message: &Message) {
        self(message)
    }
}

/// A remote router reachable from this node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NextHop {
    /// Router id of the next hop
    pub router_id: String,
}

impl NextHop {
    pub fn new(router_id: impl Into<String>) -> Self {
        Self {
            router_id: router_id.into(),
        }
    }
}

impl Display for NextHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.router_id)
    }
}

/// Strategy for forwarding a message toward a remote router
///
/// Called outside the router lock. Must not block the receive path waiting
/// for the remote hop to acknowledge.
pub trait NextHopForwarder: Send + Sync {
    /// Hand off a copy of the message; returns whether it was taken
    fn forward(&self, next_hop: &NextHop, message: Message) -> bool;
}

/// Forwarder used until inter-router links exist: drops every message
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardForwarder;

impl NextHopForwarder for DiscardForwarder {
    fn forward(&self, _next_hop: &NextHop, _message: Message) -> bool {
        false
    }
}
