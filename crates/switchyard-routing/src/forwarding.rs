//! Message forwarding
//!
//! Receive, transmit, and disposition propagation for [`RouterNode`].
//! Routing decisions are made under the router lock by [`RouterNode::route_locked`];
//! the resulting link wake-ups and next-hop hand-off run after it is released.

use std::fmt::Display;

use tracing::{debug, trace, warn};

use switchyard_core::{
    ClassifiedAddress, DeliveryRef, Disposition, LinkRef, Message, NextHop, Role, classify,
};

use crate::link::{QueuedMessage, Upstream};
use crate::router::{InFlight, RouterNode, RouterState};

/// Work left after routing under the lock
#[derive(Debug, Default)]
pub(crate) struct Routed {
    /// Local consumers (handler and link) that took a copy
    pub(crate) local_consumers: usize,
    /// The upstream delivery now rides with a queued copy
    pub(crate) upstream_taken: bool,
    /// The local link queue was full
    pub(crate) overflowed: bool,
    /// Link to wake, with its queue depth
    pub(crate) wake: Option<(LinkRef, usize)>,
    /// Copy for the next-hop forwarder
    pub(crate) remote: Option<(NextHop, Message)>,
}

impl RouterNode {
    /// Deliver a message to every consumer of its address
    ///
    /// Must be called with the router lock held. Returns `None` if no
    /// address matches.
    pub(crate) fn route_locked(
        &self,
        state: &mut RouterState,
        classified: &ClassifiedAddress,
        message: &Message,
        upstream: Option<Upstream>,
    ) -> Option<Routed> {
        let RouterState {
            addresses,
            out_links,
            stats,
            ..
        } = state;
        let address = addresses.lookup(&classified.hash_key)?;
        let mut routed = Routed::default();

        if classified.invoke_handler {
            if let Some(handler) = address.handler() {
                handler.on_message(message);
                stats.handler_deliveries += 1;
                routed.local_consumers += 1;
            }
        }

        if let Some(record) = address.local_link().and_then(|id| out_links.get_mut(&id)) {
            if record.is_full(self.config().max_queue_depth) {
                warn!(
                    link = %record.id(),
                    address = %classified.hash_key,
                    depth = record.depth(),
                    "Outbound queue full, dropping copy"
                );
                stats.overflowed += 1;
                routed.overflowed = true;
            } else {
                routed.upstream_taken = upstream.is_some();
                record.push(QueuedMessage {
                    message: message.clone(),
                    upstream,
                });
                stats.queued += 1;
                routed.local_consumers += 1;
                routed.wake = Some((record.link().clone(), record.depth()));
            }
        }

        if classified.forward_remote {
            if let Some(next_hop) = address.next_hop() {
                routed.remote = Some((next_hop.clone(), message.clone()));
            }
        }

        Some(routed)
    }

    /// Perform the post-lock work of a routing decision
    ///
    /// Returns the total number of consumers that took a copy.
    pub(crate) fn dispatch(&self, routed: Routed) -> usize {
        let mut consumers = routed.local_consumers;

        if let Some((link, depth)) = routed.wake {
            link.offered(depth);
            link.activate();
        }

        if let Some((next_hop, message)) = routed.remote {
            if self.forwarder().forward(&next_hop, message) {
                self.count(|s| s.remote_forwards += 1);
                consumers += 1;
            } else {
                trace!(next_hop = %next_hop, "Next hop did not take message");
            }
        }

        consumers
    }

    /// Handle a complete or partial inbound delivery
    pub(crate) fn receive(&self, link: &LinkRef, delivery: &DeliveryRef) {
        let Some(message) = delivery.take_message() else {
            trace!(
                link = %link.id(),
                delivery = %delivery.id(),
                "Partial delivery, waiting for more frames"
            );
            return;
        };

        link.advance();
        link.flow(1);

        let destination = match message.destination() {
            Ok(to) => to,
            Err(e) => {
                self.reject(delivery, e);
                return;
            }
        };
        let classified = match classify(destination, self.identity()) {
            Ok(classified) => classified,
            Err(e) => {
                self.reject(delivery, e);
                return;
            }
        };

        let presettled = delivery.is_remotely_settled();
        let upstream = (!presettled).then(|| Upstream::new(delivery.clone(), link.clone()));

        let routed = {
            let mut state = self.state.lock();
            state.stats.received += 1;
            self.route_locked(&mut state, &classified, &message, upstream)
        };

        let Some(routed) = routed else {
            debug!(address = %classified.hash_key, "No route, releasing delivery");
            self.settle_inbound(delivery, Disposition::Released, presettled);
            return;
        };

        let upstream_taken = routed.upstream_taken;
        let consumers = self.dispatch(routed);

        if upstream_taken {
            trace!(delivery = %delivery.id(), "Settlement deferred to downstream delivery");
        } else if consumers > 0 {
            self.settle_inbound(delivery, Disposition::Accepted, presettled);
        } else {
            debug!(address = %classified.hash_key, "No consumer took message, releasing delivery");
            self.settle_inbound(delivery, Disposition::Released, presettled);
        }
    }

    fn reject(&self, delivery: &DeliveryRef, reason: impl Display) {
        debug!(delivery = %delivery.id(), reason = %reason, "Rejecting delivery");
        delivery.update(Disposition::Rejected);
        delivery.settle();
        self.count(|s| {
            s.received += 1;
            s.rejected += 1;
        });
    }

    /// Settle an inbound delivery locally
    ///
    /// The outcome is only reported if the peer still awaits one.
    fn settle_inbound(&self, delivery: &DeliveryRef, outcome: Disposition, presettled: bool) {
        if !presettled {
            delivery.update(outcome);
        }
        delivery.settle();
        self.count(|s| match outcome {
            Disposition::Accepted => s.accepted += 1,
            Disposition::Released => s.released += 1,
            _ => {}
        });
    }

    /// Release an upstream delivery whose message will never be delivered
    pub(crate) fn release_upstream(&self, upstream: &Upstream) {
        upstream.delivery.update(Disposition::Released);
        upstream.delivery.settle();
        upstream.link.activate();
    }

    /// Write the head of a link's queue on a delivery the container allocated
    ///
    /// Returns whether a message was sent. Containers that allocate outbound
    /// deliveries themselves call this only after checking there is work;
    /// `on_link_writable` reserves the head before allocating instead. A
    /// delivery supplied for an empty queue is settled unused.
    pub fn transmit(&self, link: &LinkRef, delivery: &DeliveryRef) -> bool {
        let id = link.id();
        let popped = {
            let mut state = self.state.lock();
            state
                .out_links
                .get_mut(&id)
                .and_then(|record| record.pop().map(|queued| (queued, record.depth())))
        };

        let Some((queued, depth)) = popped else {
            warn!(
                link = %id,
                delivery = %delivery.id(),
                "Nothing queued, settling unused delivery"
            );
            delivery.settle();
            return false;
        };
        self.send_queued(link, delivery, queued, depth)
    }

    /// Put a reserved message back at the head of its link's queue
    ///
    /// If the link detached in the meantime the message is dropped and its
    /// upstream delivery released.
    pub(crate) fn requeue(&self, link: &LinkRef, queued: QueuedMessage) {
        let orphaned = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match state.out_links.get_mut(&link.id()) {
                Some(record) => {
                    record.push_front(queued);
                    None
                }
                None => {
                    state.stats.dropped_on_detach += 1;
                    queued.upstream
                }
            }
        };
        if let Some(upstream) = &orphaned {
            debug!(link = %link.id(), "Link detached while allocating, releasing upstream");
            self.release_upstream(upstream);
        }
    }

    /// Write a message already taken off the link's queue
    ///
    /// `depth` is the queue depth left behind by the pop.
    pub(crate) fn send_queued(
        &self,
        link: &LinkRef,
        delivery: &DeliveryRef,
        queued: QueuedMessage,
        depth: usize,
    ) -> bool {
        let id = link.id();
        if let Err(e) = link.send(delivery.as_ref(), &queued.message) {
            warn!(link = %id, error = %e, depth, "Send failed, releasing upstream delivery");
            delivery.settle();
            if let Some(upstream) = &queued.upstream {
                self.release_upstream(upstream);
            }
            link.offered(depth);
            if depth > 0 {
                link.activate();
            }
            return false;
        }

        let mut bound = false;
        let orphaned = {
            let mut state = self.state.lock();
            state.stats.sent += 1;
            match queued.upstream {
                // The link may have detached while the lock was released
                Some(upstream) if !state.out_links.contains_key(&id) => Some(upstream),
                Some(upstream) => {
                    state.in_flight.insert(
                        delivery.id(),
                        InFlight {
                            upstream,
                            out_link: id,
                        },
                    );
                    bound = true;
                    None
                }
                None => None,
            }
        };

        if let Some(upstream) = &orphaned {
            self.release_upstream(upstream);
        }
        if !bound {
            delivery.settle();
        }

        link.advance();
        link.offered(depth);
        trace!(link = %id, delivery = %delivery.id(), depth, "Message sent");
        true
    }

    /// Copy a downstream outcome to the upstream delivery
    pub(crate) fn propagate_disposition(&self, link: &LinkRef, delivery: &DeliveryRef) {
        if link.role() != Role::Sender {
            trace!(link = %link.id(), "Ignoring disposition change on incoming link");
            return;
        }

        let settled = delivery.is_remotely_settled();
        let outcome = delivery.remote_state();
        let upstream = {
            let mut state = self.state.lock();
            if settled {
                state.in_flight.remove(&delivery.id()).map(|f| f.upstream)
            } else {
                // Unsettled upstreams are only updated while still bound
                state.in_flight.get(&delivery.id()).map(|f| {
                    if let Some(outcome) = outcome {
                        f.upstream.delivery.update(outcome);
                    }
                    f.upstream.clone()
                })
            }
        };

        let Some(upstream) = upstream else {
            trace!(delivery = %delivery.id(), "No upstream bound to delivery");
            return;
        };

        if settled {
            if let Some(outcome) = outcome {
                upstream.delivery.update(outcome);
            }
            upstream.delivery.settle();
            delivery.settle();
        }
        if settled || outcome.is_some() {
            upstream.link.activate();
        }
    }
}
