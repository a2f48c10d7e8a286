//! Router node
//!
//! The [`RouterNode`] owns all routing state behind a single lock: the
//! address table, the incoming link list, the outgoing link records, the
//! in-flight delivery bindings, and the delivery-tag counter. Every
//! container callback takes that lock only for in-memory mutation; link
//! writes, activations, and next-hop hand-offs happen after it is released.
//! In-process handlers are the exception and run with the lock held.
//!
//! ## Settlement
//!
//! A message forwarded to a local link carries its upstream delivery in the
//! link's queue. When it is written, the new downstream delivery is bound to
//! that upstream delivery in the in-flight table. Downstream outcomes are
//! copied upstream; downstream settlement settles upstream and removes the
//! binding, after which further callbacks for that delivery are no-ops.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use switchyard_core::{
    AttachOutcome, DeliveryId, DeliveryRef, DeliveryTag, DiscardForwarder, HashKey, LinkId,
    LinkRef, Message, MessageHandler, NextHop, NextHopForwarder, NodeHandler, RouterIdentity,
    classify, registration_address,
};

use crate::config::RouterConfig;
use crate::error::{RoutingError, RoutingResult};
use crate::link::{LinkRecord, Upstream};
use crate::table::{AddressHandle, AddressTable};

/// Binding of an unsettled downstream delivery to its upstream delivery
#[derive(Debug)]
pub(crate) struct InFlight {
    pub(crate) upstream: Upstream,
    pub(crate) out_link: LinkId,
}

/// Everything guarded by the router lock
pub(crate) struct RouterState {
    pub(crate) addresses: AddressTable,
    pub(crate) in_links: Vec<LinkRef>,
    pub(crate) out_links: HashMap<LinkId, LinkRecord>,
    pub(crate) in_flight: HashMap<DeliveryId, InFlight>,
    pub(crate) stats: RouterStats,
    next_tag: u64,
}

impl RouterState {
    fn new() -> Self {
        Self {
            addresses: AddressTable::new(),
            in_links: Vec::new(),
            out_links: HashMap::new(),
            in_flight: HashMap::new(),
            stats: RouterStats::default(),
            next_tag: 1,
        }
    }

    /// Next router-wide delivery tag
    pub(crate) fn allocate_tag(&mut self) -> DeliveryTag {
        let tag = DeliveryTag(self.next_tag);
        self.next_tag += 1;
        tag
    }

    pub(crate) fn snapshot(&self) -> RouterStats {
        RouterStats {
            addresses: self.addresses.len(),
            in_links: self.in_links.len(),
            out_links: self.out_links.len(),
            in_flight: self.in_flight.len(),
            ..self.stats.clone()
        }
    }
}

/// Router counters and gauges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Complete messages received
    pub received: u64,
    /// Inbound deliveries accepted by the router
    pub accepted: u64,
    /// Inbound deliveries released (unroutable or no consumer took them)
    pub released: u64,
    /// Inbound deliveries rejected as malformed
    pub rejected: u64,
    /// In-process handler invocations
    pub handler_deliveries: u64,
    /// Copies queued on local links
    pub queued: u64,
    /// Messages written on local links
    pub sent: u64,
    /// Copies taken by the next-hop forwarder
    pub remote_forwards: u64,
    /// Copies refused because a link queue was full
    pub overflowed: u64,
    /// Queued messages discarded by a detach
    pub dropped_on_detach: u64,
    /// Maintenance timer firings
    pub timer_fires: u64,
    /// Time of the last maintenance timer firing
    pub last_maintenance: Option<DateTime<Utc>>,
    pub addresses: usize,
    pub in_links: usize,
    pub out_links: usize,
    pub in_flight: usize,
}

/// Result of a locally originated [`RouterNode::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    /// Targets that took a copy
    pub consumers: usize,
    /// Whether the local link queue was full
    pub overflowed: bool,
}

/// AMQP-style router node
///
/// Shared with the transport container through `Arc`; every method takes
/// `&self` and is safe to call from any thread.
pub struct RouterNode {
    config: RouterConfig,
    identity: RouterIdentity,
    forwarder: Arc<dyn NextHopForwarder>,
    pub(crate) state: Mutex<RouterState>,
}

impl RouterNode {
    /// Create a router node
    ///
    /// Remote next hops are served by [`DiscardForwarder`] until a forwarder
    /// is supplied with [`RouterNode::with_forwarder`].
    pub fn new(config: RouterConfig) -> RoutingResult<Self> {
        Self::with_forwarder(config, Arc::new(DiscardForwarder))
    }

    /// Create a router node with a next-hop forwarding strategy
    pub fn with_forwarder(
        config: RouterConfig,
        forwarder: Arc<dyn NextHopForwarder>,
    ) -> RoutingResult<Self> {
        config.validate()?;
        let identity = config.identity()?;
        debug!(router = %identity, "Router node created");
        Ok(Self {
            config,
            identity,
            forwarder,
            state: Mutex::new(RouterState::new()),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn identity(&self) -> &RouterIdentity {
        &self.identity
    }

    pub(crate) fn forwarder(&self) -> &Arc<dyn NextHopForwarder> {
        &self.forwarder
    }

    /// Register an in-process handler for an address
    ///
    /// With `is_local`, a bare name is registered in the `_local/` space.
    /// Fails with [`RoutingError::DuplicateAddress`] if the classified key
    /// already exists.
    pub fn register_address(
        &self,
        is_local: bool,
        address: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> RoutingResult<AddressHandle> {
        let classified = classify(&registration_address(is_local, address), &self.identity)?;
        let handle = self
            .state
            .lock()
            .addresses
            .register(classified.hash_key, is_local, Some(handler))?;
        debug!(address, key = %handle.hash_key(), "In-process address registered");
        Ok(handle)
    }

    /// Remove the handler registered through `handle`
    ///
    /// The address itself goes away once no link or next hop uses it.
    /// Stale handles are ignored.
    pub fn unregister_address(&self, handle: &AddressHandle) {
        let mut state = self.state.lock();
        let Some(address) = state.addresses.resolve_mut(handle) else {
            trace!(key = %handle.hash_key(), "Ignoring stale address handle");
            return;
        };
        address.set_handler(None);
        let removed = state.addresses.remove_if_unreferenced(handle.hash_key());
        debug!(key = %handle.hash_key(), removed, "In-process address unregistered");
    }

    /// Route a locally originated message
    ///
    /// The message is treated as pre-settled: queued copies carry no
    /// upstream delivery.
    pub fn send(&self, address: &str, message: Message) -> RoutingResult<SendOutcome> {
        let classified = classify(address, &self.identity)?;
        let routed = {
            let mut state = self.state.lock();
            self.route_locked(&mut state, &classified, &message, None)
        };
        let Some(routed) = routed else {
            debug!(address, key = %classified.hash_key, "No route for local send");
            return Err(RoutingError::NoRoute(classified.hash_key));
        };
        let overflowed = routed.overflowed;
        let consumers = self.dispatch(routed);
        Ok(SendOutcome {
            consumers,
            overflowed,
        })
    }

    /// Make an address reachable through a remote router
    pub fn set_next_hop(&self, address: &str, next_hop: NextHop) -> RoutingResult<HashKey> {
        let classified = classify(address, &self.identity)?;
        let mut state = self.state.lock();
        state
            .addresses
            .get_or_create(&classified.hash_key)
            .set_next_hop(Some(next_hop.clone()));
        debug!(key = %classified.hash_key, next_hop = %next_hop, "Next hop set");
        Ok(classified.hash_key)
    }

    /// Remove the next hop of an address
    pub fn clear_next_hop(&self, address: &str) -> RoutingResult<()> {
        let classified = classify(address, &self.identity)?;
        let mut state = self.state.lock();
        if let Some(existing) = state.addresses.lookup_mut(&classified.hash_key) {
            existing.set_next_hop(None);
            state.addresses.remove_if_unreferenced(&classified.hash_key);
        }
        Ok(())
    }

    /// Whether an address with the same classified key exists
    pub fn has_address(&self, address: &str) -> bool {
        match classify(address, &self.identity) {
            Ok(classified) => self.state.lock().addresses.contains(&classified.hash_key),
            Err(_) => false,
        }
    }

    /// All address keys, sorted
    pub fn address_keys(&self) -> Vec<HashKey> {
        self.state.lock().addresses.keys()
    }

    /// Messages queued on an outgoing link, `None` if the link is not bound
    pub fn queue_depth(&self, link: LinkId) -> Option<usize> {
        self.state.lock().out_links.get(&link).map(LinkRecord::depth)
    }

    /// Snapshot of counters and gauges
    pub fn stats(&self) -> RouterStats {
        self.state.lock().snapshot()
    }

    pub(crate) fn count(&self, update: impl FnOnce(&mut RouterStats)) {
        update(&mut self.state.lock().stats);
    }
}

impl std::fmt::Debug for RouterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterNode")
            .field("identity", &self.identity)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Display for RouterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "router {}", self.identity)
    }
}

impl NodeHandler for RouterNode {
    fn on_link_attach_incoming(&self, link: &LinkRef) -> AttachOutcome {
        self.attach_incoming(link)
    }

    fn on_link_attach_outgoing(&self, link: &LinkRef) -> AttachOutcome {
        self.attach_outgoing(link)
    }

    fn on_message_received(&self, link: &LinkRef, delivery: &DeliveryRef) {
        self.receive(link, delivery)
    }

    fn on_link_writable(&self, link: &LinkRef) -> bool {
        self.writable(link)
    }

    fn on_disposition_changed(&self, link: &LinkRef, delivery: &DeliveryRef) {
        self.propagate_disposition(link, delivery)
    }

    fn on_link_detached(&self, link: &LinkRef, closed: bool) {
        self.detach(link, closed)
    }

    fn on_timer_fire(&self) -> Duration {
        self.maintenance_tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchyard_core::{Delivery, Disposition, Link, MockLink};

    fn make_router() -> RouterNode {
        RouterNode::new(RouterConfig::new("A0", "R0")).unwrap()
    }

    fn counting_handler() -> (Arc<AtomicUsize>, Arc<dyn MessageHandler>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let handler: Arc<dyn MessageHandler> = Arc::new(move |_: &Message| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(RouterNode::new(RouterConfig::new("", "R0")).is_err());
    }

    #[test]
    fn test_register_and_lookup_same_address() {
        let router = make_router();
        let (_, handler) = counting_handler();

        let handle = router.register_address(true, "_local/stats", handler).unwrap();
        assert_eq!(handle.hash_key().as_str(), "Lstats");
        assert!(router.has_address("_local/stats"));
        assert!(router.has_address("_topo/A0/R0/stats"));
    }

    #[test]
    fn test_register_duplicate() {
        let router = make_router();
        let (_, first) = counting_handler();
        let (_, second) = counting_handler();

        router.register_address(true, "stats", first).unwrap();
        let err = router.register_address(true, "_local/stats", second).unwrap_err();
        assert!(matches!(err, RoutingError::DuplicateAddress(_)));
    }

    #[test]
    fn test_unregister_removes_unused_address() {
        let router = make_router();
        let (_, handler) = counting_handler();

        let handle = router.register_address(false, "orders", handler).unwrap();
        assert!(router.has_address("orders"));

        router.unregister_address(&handle);
        assert!(!router.has_address("orders"));

        // Second call is a no-op
        router.unregister_address(&handle);
    }

    #[test]
    fn test_unregister_keeps_address_with_link() {
        let router = make_router();
        let (_, handler) = counting_handler();
        let handle = router.register_address(true, "stats", handler).unwrap();

        let out = MockLink::sender("_local/stats");
        assert!(router.on_link_attach_outgoing(&out.as_link()).is_accepted());

        router.unregister_address(&handle);
        assert!(router.has_address("_local/stats"));

        router.send("_local/stats", Message::to_address("_local/stats", "x")).unwrap();
        assert_eq!(router.queue_depth(out.id()), Some(1));
    }

    #[test]
    fn test_send_to_handler() {
        let router = make_router();
        let (count, handler) = counting_handler();
        router.register_address(true, "stats", handler).unwrap();

        let outcome = router
            .send("_local/stats", Message::to_address("_local/stats", "x"))
            .unwrap();
        assert_eq!(outcome.consumers, 1);
        assert!(!outcome.overflowed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_send_without_route() {
        let router = make_router();
        let err = router.send("nowhere", Message::to_address("nowhere", "x")).unwrap_err();
        assert!(matches!(err, RoutingError::NoRoute(k) if k.as_str() == "Mnowhere"));
        assert!(router.address_keys().is_empty());
    }

    #[test]
    fn test_sent_message_is_presettled_downstream() {
        let router = make_router();
        let out = MockLink::sender("orders");
        router.on_link_attach_outgoing(&out.as_link());

        router.send("orders", Message::to_address("orders", "x")).unwrap();
        assert!(router.on_link_writable(&out.as_link()));

        let downstream = out.last_delivery().unwrap();
        assert!(downstream.is_settled());
        assert_eq!(router.stats().in_flight, 0);
    }

    #[test]
    fn test_next_hop_lifecycle() {
        let router = make_router();
        let key = router.set_next_hop("_topo/A9/R1/svc", NextHop::new("R1")).unwrap();
        assert_eq!(key.as_str(), "AA9");
        assert!(router.has_address("_topo/A9/all/other"));

        router.clear_next_hop("_topo/A9/R1/svc").unwrap();
        assert!(!router.has_address("_topo/A9/R1/svc"));
    }

    #[test]
    fn test_delivery_tags_are_monotonic() {
        let router = make_router();
        let out = MockLink::sender("orders");
        router.on_link_attach_outgoing(&out.as_link());

        for _ in 0..3 {
            router.send("orders", Message::to_address("orders", "x")).unwrap();
        }
        while router.on_link_writable(&out.as_link()) {}

        let tags: Vec<_> = out.deliveries().iter().filter_map(|d| d.tag()).collect();
        assert_eq!(tags, vec![DeliveryTag(1), DeliveryTag(2), DeliveryTag(3)]);
    }

    #[test]
    fn test_stats_snapshot() {
        let router = make_router();
        let inbound = MockLink::receiver("orders");
        router.on_link_attach_incoming(&inbound.as_link());

        let delivery = inbound.incoming(Message::to_address("orders", "x"));
        router.on_message_received(&inbound.as_link(), &delivery.as_delivery());

        let stats = router.stats();
        assert_eq!(stats.received, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.in_links, 1);
        assert_eq!(delivery.local_state(), Some(Disposition::Released));
    }
}
