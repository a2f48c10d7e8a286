//! Link lifecycle
//!
//! Attach, detach, and writable handling for [`RouterNode`].

use std::collections::TryReserveError;

use tracing::{debug, trace, warn};

use switchyard_core::{AttachOutcome, LinkId, LinkRef, Role, classify};

use crate::link::{LinkRecord, Upstream};
use crate::router::{RouterNode, RouterState};

/// Why an outgoing attach was refused
enum Refusal {
    /// Another link already consumes from the address
    Bound(LinkId),
    Exhausted(TryReserveError),
}

impl RouterNode {
    /// Accept a link on which the peer sends to the router
    pub(crate) fn attach_incoming(&self, link: &LinkRef) -> AttachOutcome {
        let reserved = {
            let mut state = self.state.lock();
            let reserved = state.in_links.try_reserve(1);
            if reserved.is_ok() {
                state.in_links.push(link.clone());
            }
            reserved
        };
        if let Err(e) = reserved {
            warn!(link = %link.id(), error = %e, "Cannot track incoming link, closing");
            link.close();
            return AttachOutcome::Closed;
        }

        link.mirror_remote_terms();
        link.flow(self.config().initial_credit);
        link.open();
        debug!(
            link = %link.id(),
            target = ?link.remote_target(),
            credit = self.config().initial_credit,
            "Incoming link attached"
        );
        AttachOutcome::Accepted
    }

    /// Bind a link on which the router sends to the address named by its target
    pub(crate) fn attach_outgoing(&self, link: &LinkRef) -> AttachOutcome {
        let Some(target) = link.remote_target().filter(|t| !t.is_empty()) else {
            debug!(link = %link.id(), "Outgoing link has no target, closing");
            link.close();
            return AttachOutcome::Closed;
        };
        let classified = match classify(&target, self.identity()) {
            Ok(classified) => classified,
            Err(e) => {
                debug!(
                    link = %link.id(),
                    remote_target = %target,
                    error = %e,
                    "Unusable target, closing"
                );
                link.close();
                return AttachOutcome::Closed;
            }
        };

        let bound = {
            let mut state = self.state.lock();
            let RouterState {
                addresses,
                out_links,
                ..
            } = &mut *state;
            match out_links.try_reserve(1) {
                Err(e) => Err(Refusal::Exhausted(e)),
                Ok(()) => {
                    let address = addresses.get_or_create(&classified.hash_key);
                    match address.local_link() {
                        Some(existing) => Err(Refusal::Bound(existing)),
                        None => {
                            address.bind_link(link.id());
                            out_links.insert(
                                link.id(),
                                LinkRecord::new(link.clone(), classified.hash_key.clone()),
                            );
                            Ok(())
                        }
                    }
                }
            }
        };

        match bound {
            Ok(()) => {
                link.mirror_remote_terms();
                link.open();
                debug!(link = %link.id(), address = %classified.hash_key, "Outgoing link bound");
                AttachOutcome::Accepted
            }
            Err(Refusal::Bound(existing)) => {
                warn!(
                    link = %link.id(),
                    address = %classified.hash_key,
                    existing = %existing,
                    "Address already has a consumer link, closing"
                );
                link.close();
                AttachOutcome::Closed
            }
            Err(Refusal::Exhausted(e)) => {
                warn!(link = %link.id(), error = %e, "Cannot track outgoing link, closing");
                link.close();
                AttachOutcome::Closed
            }
        }
    }

    /// Forget a link the peer detached or the container closed
    pub(crate) fn detach(&self, link: &LinkRef, closed: bool) {
        let id = link.id();
        match link.role() {
            Role::Receiver => {
                let mut state = self.state.lock();
                state.in_links.retain(|l| l.id() != id);
                debug!(link = %id, closed, "Incoming link detached");
            }
            Role::Sender => {
                let orphaned = {
                    let mut state = self.state.lock();
                    let RouterState {
                        addresses,
                        out_links,
                        in_flight,
                        stats,
                        ..
                    } = &mut *state;

                    // Refused attaches never got a record
                    let Some(mut record) = out_links.remove(&id) else {
                        trace!(link = %id, "Detached link was never bound");
                        return;
                    };
                    if let Some(address) = addresses.lookup_mut(record.hash_key()) {
                        address.unbind_link(id);
                    }
                    let removed = addresses.remove_if_unreferenced(record.hash_key());

                    let queued = record.drain();
                    stats.dropped_on_detach += queued.len() as u64;
                    let mut orphaned: Vec<Upstream> =
                        queued.into_iter().filter_map(|q| q.upstream).collect();

                    in_flight.retain(|_, f| {
                        if f.out_link == id {
                            orphaned.push(f.upstream.clone());
                            false
                        } else {
                            true
                        }
                    });

                    debug!(
                        link = %id,
                        address = %record.hash_key(),
                        closed,
                        removed,
                        orphaned = orphaned.len(),
                        "Outgoing link detached"
                    );
                    orphaned
                };

                for upstream in &orphaned {
                    self.release_upstream(upstream);
                }
            }
        }
    }

    /// Send the head of the link's queue if a delivery slot is available
    ///
    /// The head is reserved and the tag allocated under one lock hold, so a
    /// concurrent poll of the same link cannot take the message out from
    /// under the slot. The container calls again while this returns `true`.
    pub(crate) fn writable(&self, link: &LinkRef) -> bool {
        let id = link.id();
        let reserved = {
            let mut state = self.state.lock();
            let head = state
                .out_links
                .get_mut(&id)
                .and_then(|record| record.pop().map(|queued| (queued, record.depth())));
            head.map(|(queued, depth)| (queued, depth, state.allocate_tag()))
        };
        let Some((queued, depth, tag)) = reserved else {
            return false;
        };

        let Some(delivery) = link.new_delivery(tag) else {
            trace!(link = %id, tag = %tag, "No delivery slot available");
            self.requeue(link, queued);
            return false;
        };
        self.send_queued(link, &delivery, queued, depth)
    }
}
