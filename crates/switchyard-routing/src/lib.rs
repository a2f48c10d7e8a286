//! # Switchyard Routing
//!
//! Router node for Switchyard.
//!
//! The router accepts links from a transport container, receives messages on
//! incoming links, and forwards each one to the consumers of its destination
//! address: an in-process handler, a locally attached outgoing link, and a
//! remote next hop. Settlement of a forwarded message is driven end to end:
//! the outcome the final consumer reports is copied back to the original
//! sender's delivery.
//!
//! ## Core Components
//!
//! - [`RouterNode`]: The node itself; implements [`NodeHandler`] for the container
//! - [`AddressTable`]: Classified address keys mapped to their consumers
//! - [`LinkRecord`]: FIFO outbound queue of one outgoing link
//! - [`MaintenanceTask`]: Tokio task driving the router's periodic timer
//!
//! ## Address Classes
//!
//! Addresses are classified against the router's area and id:
//!
//! 1. **Local** (`_local/x`, or `_topo/` naming this router): handler is invoked
//! 2. **Area** (`_topo/` naming another area): forwarded toward that area
//! 3. **Router** (`_topo/` naming another router in this area): forwarded toward it
//! 4. **Mobile** (anything else): handler invoked and forwarded
//!
//! A locally attached link for the key always receives a copy.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use switchyard_core::{Message, MessageHandler, NodeHandler};
//! use switchyard_routing::{RouterConfig, RouterNode};
//!
//! let router = Arc::new(RouterNode::new(RouterConfig::new("area0", "router0"))?);
//!
//! let stats: Arc<dyn MessageHandler> = Arc::new(|m: &Message| println!("{:?}", m.body()));
//! router.register_address(true, "stats", stats)?;
//!
//! // The container now drives the router through NodeHandler callbacks
//! router.on_link_attach_incoming(&link);
//! router.on_message_received(&link, &delivery);
//! ```

pub mod config;
pub mod error;
pub mod forwarding;
pub mod lifecycle;
pub mod link;
pub mod maintenance;
pub mod router;
pub mod table;

// Re-export main types
pub use config::{DEFAULT_INITIAL_CREDIT, DEFAULT_TIMER_INTERVAL_MS, RouterConfig};
pub use error::{RoutingError, RoutingResult};
pub use link::{LinkRecord, QueuedMessage, Upstream};
pub use maintenance::MaintenanceTask;
pub use router::{RouterNode, RouterStats, SendOutcome};
pub use table::{Address, AddressHandle, AddressTable};

// Re-export core types used at the router's API surface
pub use switchyard_core::{AttachOutcome, NextHop, NextHopForwarder, NodeHandler};
