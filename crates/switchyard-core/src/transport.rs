//! Transport seam
//!
//! The router never talks to the network directly. The transport container
//! hands it [`Link`] and [`Delivery`] handles; the router mutates their
//! state and asks the container to re-poll links with [`Link::activate`].
//!
//! ## Implementations
//!
//! - [`MockLink`](crate::MockLink) / [`MockDelivery`](crate::MockDelivery):
//!   in-memory recording implementations for testing (in this crate)
//! - A real container adapts its protocol engine's link and delivery objects

use std::fmt::{Debug, Display};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::message::Message;

/// Identifier of a link, unique within a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Identifier of a delivery, unique within a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub u64);

impl Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dlv-{}", self.0)
    }
}

/// Delivery tag allocated by the router for outbound deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeliveryTag(pub u64);

impl Display for DeliveryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Which end of a link the router holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The router sends on this link (outgoing, downstream)
    Sender,
    /// The router receives on this link (incoming, upstream)
    Receiver,
}

/// Delivery outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Disposition {
    /// Partial progress report
    Received,
    /// Processed successfully
    Accepted,
    /// Never retry this exact message
    Rejected,
    /// Not processed; may be retried, possibly elsewhere
    Released,
    /// Not processed; retry with modified annotations
    Modified,
}

/// A transport link endpoint
///
/// Handles are shared with the container; all methods take `&self` and
/// implementations use interior mutability.
pub trait Link: Send + Sync + Debug {
    /// Link identifier
    fn id(&self) -> LinkId;

    /// Router-side role of the link
    fn role(&self) -> Role;

    /// Address of the source terminus the peer offered
    fn remote_source(&self) -> Option<String>;

    /// Address of the target terminus the peer offered
    fn remote_target(&self) -> Option<String>;

    /// Copy the peer-offered source and target onto the local termini
    fn mirror_remote_terms(&self);

    /// Grant additional credit to the peer
    fn flow(&self, credit: u32);

    /// Open the link
    fn open(&self);

    /// Close the link
    fn close(&self);

    /// Ask the container to re-poll the link
    fn activate(&self);

    /// Report how many messages are available to send
    fn offered(&self, count: usize);

    /// Move past the current delivery
    fn advance(&self);

    /// Start a new outbound delivery, if a slot is available
    fn new_delivery(&self, tag: DeliveryTag) -> Option<DeliveryRef>;

    /// Write a message on an outbound delivery
    fn send(&self, delivery: &dyn Delivery, message: &Message) -> Result<(), TransportError>;
}

/// One hop of a message transfer
pub trait Delivery: Send + Sync + Debug {
    /// Delivery identifier
    fn id(&self) -> DeliveryId;

    /// Take the assembled message, `None` while frames are still arriving
    fn take_message(&self) -> Option<Message>;

    /// Outcome the peer reported, if any
    fn remote_state(&self) -> Option<Disposition>;

    /// Whether the peer has settled
    fn is_remotely_settled(&self) -> bool;

    /// Set the local outcome
    fn update(&self, state: Disposition);

    /// Settle locally
    fn settle(&self);

    /// Whether the delivery has been settled locally
    fn is_settled(&self) -> bool;
}

/// Shared link handle
pub type LinkRef = Arc<dyn Link>;

/// Shared delivery handle
pub type DeliveryRef = Arc<dyn Delivery>;
