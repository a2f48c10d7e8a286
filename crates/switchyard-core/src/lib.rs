//! # Switchyard Core
//!
//! Core traits, types, and errors for the Switchyard message router.
//!
//! This crate holds everything the routing engine shares with the transport
//! container that drives it. The container owns connections and the wire
//! codec; the router only sees the abstractions defined here.
//!
//! ## Key Traits
//!
//! - [`Link`]: A transport link endpoint (sender or receiver) borrowed by the router
//! - [`Delivery`]: One hop of a message transfer with its own settlement state
//! - [`NodeHandler`]: The callback surface a router node exposes to the container
//! - [`MessageHandler`]: An in-process consumer registered on an address
//! - [`NextHopForwarder`]: Pluggable strategy for forwarding toward a remote router
//!
//! ## Key Types
//!
//! - [`HashKey`]: The classified address key used for address table lookups
//! - [`ClassifiedAddress`]: Result of [`classify`], including receive semantics
//! - [`Message`]: A fully received message with typed section accessors
//! - [`Disposition`]: Delivery outcome codes (accepted, released, rejected, ...)

pub mod address;
pub mod error;
pub mod message;
pub mod mock_transport;
pub mod traits;
pub mod transport;

// Re-export main types
pub use address::*;
pub use error::*;
pub use message::*;
pub use mock_transport::*;
pub use traits::*;
pub use transport::*;
