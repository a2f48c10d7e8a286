//! Stress tests for switchyard-routing
//!
//! These tests drive the router's callbacks from many threads at once and
//! check that every inbound delivery ends up settled exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

use switchyard_core::{
    Delivery, Disposition, Link, Message, MessageHandler, MockDelivery, MockLink, NodeHandler,
};
use switchyard_routing::{RouterConfig, RouterNode};

fn make_router() -> Arc<RouterNode> {
    Arc::new(RouterNode::new(RouterConfig::new("A0", "R0")).unwrap())
}

#[test]
fn test_concurrent_handler_delivery() {
    const THREADS: usize = 8;
    const MESSAGES_PER_THREAD: usize = 2_000;

    let router = make_router();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handler: Arc<dyn MessageHandler> = Arc::new(move |_: &Message| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    router.register_address(true, "stats", handler).unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let start = Instant::now();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let router = router.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let link = MockLink::receiver("_local/stats");
                router.on_link_attach_incoming(&link.as_link());
                barrier.wait();

                for i in 0..MESSAGES_PER_THREAD {
                    let message = Message::to_address("_local/stats", format!("m{}", i));
                    let delivery = link.incoming(message);
                    router.on_message_received(&link.as_link(), &delivery.as_delivery());
                    assert_eq!(delivery.local_state(), Some(Disposition::Accepted));
                    assert_eq!(delivery.settle_count(), 1);
                }
                router.on_link_detached(&link.as_link(), true);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    let total = THREADS * MESSAGES_PER_THREAD;
    println!("Delivered {} messages to handler in {:?}", total, elapsed);

    assert_eq!(calls.load(Ordering::Relaxed), total);
    let stats = router.stats();
    assert_eq!(stats.accepted as usize, total);
    assert_eq!(stats.in_links, 0);
}

#[test]
fn test_concurrent_forward_and_settle() {
    const PRODUCERS: usize = 4;
    const MESSAGES_PER_PRODUCER: usize = 1_000;
    const TOTAL: usize = PRODUCERS * MESSAGES_PER_PRODUCER;

    let router = make_router();
    let out = MockLink::sender("orders");
    assert!(router.on_link_attach_outgoing(&out.as_link()).is_accepted());

    let barrier = Arc::new(Barrier::new(PRODUCERS + 1));
    let start = Instant::now();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let router = router.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let link = MockLink::receiver("orders");
                router.on_link_attach_incoming(&link.as_link());
                barrier.wait();

                (0..MESSAGES_PER_PRODUCER)
                    .map(|i| {
                        let message = Message::to_address("orders", format!("{}", i));
                        let delivery = link.incoming(message);
                        router.on_message_received(&link.as_link(), &delivery.as_delivery());
                        delivery
                    })
                    .collect::<Vec<Arc<MockDelivery>>>()
            })
        })
        .collect();

    // Consumer: write and settle as fast as messages arrive
    let consumer = {
        let router = router.clone();
        let out = out.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            let mut settled = 0;
            while settled < TOTAL {
                if router.on_link_writable(&out.as_link()) {
                    let downstream = out.last_delivery().unwrap();
                    downstream.set_remote_state(Disposition::Accepted);
                    downstream.remote_settle();
                    router.on_disposition_changed(&out.as_link(), &downstream.as_delivery());
                    settled += 1;
                } else {
                    thread::yield_now();
                }
            }
        })
    };

    let upstreams: Vec<_> = producers
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    consumer.join().unwrap();

    let elapsed = start.elapsed();
    println!("Forwarded and settled {} messages in {:?}", TOTAL, elapsed);

    for upstream in &upstreams {
        assert_eq!(upstream.local_state(), Some(Disposition::Accepted));
        assert_eq!(upstream.settle_count(), 1);
    }
    assert_eq!(out.sent_messages().len(), TOTAL);

    let stats = router.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(router.queue_depth(out.id()), Some(0));
}

#[test]
fn test_attach_detach_churn() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 500;

    let router = make_router();
    let barrier = Arc::new(Barrier::new(THREADS));
    let start = Instant::now();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let router = router.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for round in 0..ROUNDS {
                    // Half the threads contend on one shared address
                    let target = if t % 2 == 0 {
                        "shared".to_string()
                    } else {
                        format!("own-{}-{}", t, round)
                    };
                    let link = MockLink::sender(target);
                    router.on_link_attach_outgoing(&link.as_link());
                    router.on_link_detached(&link.as_link(), true);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    println!(
        "{} attach/detach cycles in {:?}",
        THREADS * ROUNDS,
        start.elapsed()
    );

    let stats = router.stats();
    assert_eq!(stats.out_links, 0);
    assert_eq!(stats.addresses, 0);
}

#[test]
fn test_detach_under_load_settles_everything() {
    const MESSAGES: usize = 2_000;

    let router = make_router();
    let inbound = MockLink::receiver("orders");
    router.on_link_attach_incoming(&inbound.as_link());
    let out = MockLink::sender("orders");
    router.on_link_attach_outgoing(&out.as_link());

    let barrier = Arc::new(Barrier::new(2));

    let producer = {
        let router = router.clone();
        let inbound = inbound.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            (0..MESSAGES)
                .map(|i| {
                    let message = Message::to_address("orders", format!("{}", i));
                    let delivery = inbound.incoming(message);
                    router.on_message_received(&inbound.as_link(), &delivery.as_delivery());
                    delivery
                })
                .collect::<Vec<_>>()
        })
    };

    barrier.wait();
    for _ in 0..MESSAGES / 4 {
        router.on_link_writable(&out.as_link());
    }
    router.on_link_detached(&out.as_link(), true);

    let upstreams = producer.join().unwrap();
    for upstream in &upstreams {
        // Every delivery is either in flight on the detached link (released),
        // queued there (released), or arrived after the detach (released)
        assert!(upstream.is_settled(), "{} never settled", upstream.id());
        assert_eq!(upstream.settle_count(), 1);
        assert_eq!(upstream.local_state(), Some(Disposition::Released));
    }
    assert_eq!(router.stats().in_flight, 0);
}

#[test]
fn test_outcome_updates_racing_detach() {
    const MESSAGES: usize = 2_000;

    let router = make_router();
    let inbound = MockLink::receiver("orders");
    router.on_link_attach_incoming(&inbound.as_link());
    let out = MockLink::sender("orders");
    router.on_link_attach_outgoing(&out.as_link());

    let upstreams: Vec<_> = (0..MESSAGES)
        .map(|i| {
            let delivery = inbound.incoming(Message::to_address("orders", format!("{}", i)));
            router.on_message_received(&inbound.as_link(), &delivery.as_delivery());
            delivery
        })
        .collect();
    while router.on_link_writable(&out.as_link()) {}
    assert_eq!(router.stats().in_flight, MESSAGES);

    let barrier = Arc::new(Barrier::new(2));
    let start = Instant::now();

    // Unsettled outcome reports race the detach that releases everything
    let reporter = {
        let router = router.clone();
        let out = out.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            for downstream in out.deliveries() {
                downstream.set_remote_state(Disposition::Accepted);
                router.on_disposition_changed(&out.as_link(), &downstream.as_delivery());
            }
        })
    };

    barrier.wait();
    router.on_link_detached(&out.as_link(), false);
    reporter.join().unwrap();

    println!("Raced {} outcome reports against detach in {:?}", MESSAGES, start.elapsed());

    for upstream in &upstreams {
        assert_eq!(upstream.settle_count(), 1, "{} settled twice", upstream.id());
        assert_eq!(upstream.updates_after_settle(), 0, "{} changed after settle", upstream.id());
        assert_eq!(upstream.local_state(), Some(Disposition::Released));
    }
    assert_eq!(router.stats().in_flight, 0);
}
