//! Error types for Switchyard

use thiserror::Error;

use crate::message::Depth;

/// Top-level error type for Switchyard
#[derive(Debug, Error)]
pub enum SwitchyardError {
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors related to address parsing and classification
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address is empty")]
    Empty,

    #[error("Invalid router identity: {0}")]
    InvalidIdentity(String),
}

/// Errors raised while validating a received message
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("Malformed {0:?} section")]
    Malformed(Depth),

    #[error("Missing {0:?} section")]
    MissingSection(Depth),

    #[error("Message has no destination address")]
    MissingDestination,
}

/// Errors reported by the transport layer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Link closed: {0}")]
    LinkClosed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Delivery slot unavailable")]
    NoDeliverySlot,
}
