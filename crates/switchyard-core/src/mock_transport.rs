//! Mock transport implementation for testing
//!
//! Provides in-memory [`Link`] and [`Delivery`] implementations that record
//! every call the router makes, so routing logic can be tested without a
//! protocol engine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use switchyard_core::{Message, MockLink, NodeHandler};
//!
//! let inbound = MockLink::receiver("_local/stats");
//! router.on_link_attach_incoming(&inbound.as_link());
//!
//! let delivery = inbound.incoming(Message::to_address("_local/stats", "ping"));
//! router.on_message_received(&inbound.as_link(), &delivery.as_delivery());
//! assert!(delivery.is_settled());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::message::Message;
use crate::transport::{
    Delivery, DeliveryId, DeliveryRef, DeliveryTag, Disposition, Link, LinkId, LinkRef, Role,
};

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_DELIVERY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct MockLinkState {
    local_source: Option<String>,
    local_target: Option<String>,
    opened: bool,
    closed: bool,
    credit: u32,
    activations: usize,
    offered: usize,
    advances: usize,
    deliveries: Vec<Arc<MockDelivery>>,
    sent: Vec<(DeliveryId, Message)>,
}

/// A mock link that records router interactions
#[derive(Debug)]
pub struct MockLink {
    id: LinkId,
    role: Role,
    remote_source: Option<String>,
    remote_target: Option<String>,
    /// Whether `new_delivery` hands out slots
    slots_available: AtomicBool,
    /// Whether `send` fails
    fail_sends: AtomicBool,
    state: Mutex<MockLinkState>,
}

impl MockLink {
    /// Create a link with explicit role and termini
    pub fn new(
        role: Role,
        remote_source: Option<String>,
        remote_target: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: LinkId(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed)),
            role,
            remote_source,
            remote_target,
            slots_available: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            state: Mutex::new(MockLinkState::default()),
        })
    }

    /// A link the router sends on, targeting `target`
    pub fn sender(target: impl Into<String>) -> Arc<Self> {
        Self::new(Role::Sender, None, Some(target.into()))
    }

    /// A link the router sends on whose peer offered no target
    pub fn sender_without_target() -> Arc<Self> {
        Self::new(Role::Sender, None, None)
    }

    /// A link the router receives on, targeting `target`
    pub fn receiver(target: impl Into<String>) -> Arc<Self> {
        Self::new(Role::Receiver, None, Some(target.into()))
    }

    /// This link as a shared trait object
    pub fn as_link(self: &Arc<Self>) -> LinkRef {
        self.clone()
    }

    /// Start an inbound delivery carrying a complete message
    pub fn incoming(&self, message: Message) -> Arc<MockDelivery> {
        let delivery = MockDelivery::new(None);
        *delivery.message.lock() = Some(message);
        delivery
    }

    /// Start an inbound delivery the peer already settled
    pub fn incoming_presettled(&self, message: Message) -> Arc<MockDelivery> {
        let delivery = self.incoming(message);
        delivery.remote_settle();
        delivery
    }

    /// Start an inbound delivery whose frames have not all arrived
    pub fn incoming_partial(&self) -> Arc<MockDelivery> {
        MockDelivery::new(None)
    }

    /// Stop (or resume) handing out delivery slots
    pub fn set_slots_available(&self, available: bool) {
        self.slots_available.store(available, Ordering::SeqCst);
    }

    /// Make subsequent sends fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        let state = self.state.lock();
        state.opened && !state.closed
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Total credit granted
    pub fn credit(&self) -> u32 {
        self.state.lock().credit
    }

    /// Number of activation requests
    pub fn activations(&self) -> usize {
        self.state.lock().activations
    }

    /// Last reported offered count
    pub fn offered_count(&self) -> usize {
        self.state.lock().offered
    }

    /// Number of advances
    pub fn advances(&self) -> usize {
        self.state.lock().advances
    }

    /// Local target after terms were mirrored
    pub fn local_target(&self) -> Option<String> {
        self.state.lock().local_target.clone()
    }

    /// Local source after terms were mirrored
    pub fn local_source(&self) -> Option<String> {
        self.state.lock().local_source.clone()
    }

    /// Messages written on this link, in order
    pub fn sent_messages(&self) -> Vec<Message> {
        self.state.lock().sent.iter().map(|(_, m)| m.clone()).collect()
    }

    /// Outbound deliveries created on this link, in order
    pub fn deliveries(&self) -> Vec<Arc<MockDelivery>> {
        self.state.lock().deliveries.clone()
    }

    /// Most recent outbound delivery
    pub fn last_delivery(&self) -> Option<Arc<MockDelivery>> {
        self.state.lock().deliveries.last().cloned()
    }
}

impl Link for MockLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn role(&self) -> Role {
        self.role
    }

    fn remote_source(&self) -> Option<String> {
        self.remote_source.clone()
    }

    fn remote_target(&self) -> Option<String> {
        self.remote_target.clone()
    }

    fn mirror_remote_terms(&self) {
        let mut state = self.state.lock();
        state.local_source = self.remote_source.clone();
        state.local_target = self.remote_target.clone();
    }

    fn flow(&self, credit: u32) {
        let mut state = self.state.lock();
        state.credit = state.credit.saturating_add(credit);
    }

    fn open(&self) {
        self.state.lock().opened = true;
    }

    fn close(&self) {
        self.state.lock().closed = true;
    }

    fn activate(&self) {
        self.state.lock().activations += 1;
    }

    fn offered(&self, count: usize) {
        self.state.lock().offered = count;
    }

    fn advance(&self) {
        self.state.lock().advances += 1;
    }

    fn new_delivery(&self, tag: DeliveryTag) -> Option<DeliveryRef> {
        if !self.slots_available.load(Ordering::SeqCst) {
            return None;
        }
        let delivery = MockDelivery::new(Some(tag));
        self.state.lock().deliveries.push(delivery.clone());
        Some(delivery)
    }

    fn send(&self, delivery: &dyn Delivery, message: &Message) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(format!("{} refused write", self.id)));
        }
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::LinkClosed(self.id.to_string()));
        }
        state.sent.push((delivery.id(), message.clone()));
        Ok(())
    }
}

/// A mock delivery with observable settlement state
#[derive(Debug)]
pub struct MockDelivery {
    id: DeliveryId,
    tag: Option<DeliveryTag>,
    message: Mutex<Option<Message>>,
    remote_state: Mutex<Option<Disposition>>,
    remotely_settled: AtomicBool,
    local_state: Mutex<Option<Disposition>>,
    settle_count: AtomicUsize,
    /// Outcome changes made after the delivery was settled
    late_updates: AtomicUsize,
}

impl MockDelivery {
    fn new(tag: Option<DeliveryTag>) -> Arc<Self> {
        Arc::new(Self {
            id: DeliveryId(NEXT_DELIVERY_ID.fetch_add(1, Ordering::Relaxed)),
            tag,
            message: Mutex::new(None),
            remote_state: Mutex::new(None),
            remotely_settled: AtomicBool::new(false),
            local_state: Mutex::new(None),
            settle_count: AtomicUsize::new(0),
            late_updates: AtomicUsize::new(0),
        })
    }

    /// This delivery as a shared trait object
    pub fn as_delivery(self: &Arc<Self>) -> DeliveryRef {
        self.clone()
    }

    /// Deliver the remaining frames
    pub fn complete(&self, message: Message) {
        *self.message.lock() = Some(message);
    }

    /// Simulate the peer reporting an outcome
    pub fn set_remote_state(&self, state: Disposition) {
        *self.remote_state.lock() = Some(state);
    }

    /// Simulate the peer settling
    pub fn remote_settle(&self) {
        self.remotely_settled.store(true, Ordering::SeqCst);
    }

    /// Tag the router allocated (outbound deliveries only)
    pub fn tag(&self) -> Option<DeliveryTag> {
        self.tag
    }

    /// Outcome the router set
    pub fn local_state(&self) -> Option<Disposition> {
        *self.local_state.lock()
    }

    /// How many times the router settled this delivery
    pub fn settle_count(&self) -> usize {
        self.settle_count.load(Ordering::SeqCst)
    }

    /// How many times the outcome was changed after settlement
    pub fn updates_after_settle(&self) -> usize {
        self.late_updates.load(Ordering::SeqCst)
    }
}

impl Delivery for MockDelivery {
    fn id(&self) -> DeliveryId {
        self.id
    }

    fn take_message(&self) -> Option<Message> {
        self.message.lock().take()
    }

    fn remote_state(&self) -> Option<Disposition> {
        *self.remote_state.lock()
    }

    fn is_remotely_settled(&self) -> bool {
        self.remotely_settled.load(Ordering::SeqCst)
    }

    fn update(&self, state: Disposition) {
        let mut local = self.local_state.lock();
        if self.is_settled() {
            self.late_updates.fetch_add(1, Ordering::SeqCst);
        }
        *local = Some(state);
    }

    fn settle(&self) {
        self.settle_count.fetch_add(1, Ordering::SeqCst);
    }

    fn is_settled(&self) -> bool {
        self.settle_count.load(Ordering::SeqCst) > 0
    }
}
