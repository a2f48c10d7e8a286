//! Message representation
//!
//! A [`Message`] is what the wire codec hands the router once every frame of
//! a delivery has arrived. The router only inspects the addressing sections;
//! the body is carried as opaque bytes and copies share the same buffer.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::MessageError;

/// Message sections in wire order
///
/// Validation is requested "through" a section: every section up to and
/// including the given depth must parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Depth {
    Header,
    DeliveryAnnotations,
    MessageAnnotations,
    Properties,
    ApplicationProperties,
    Body,
}

/// Transfer header section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub durable: bool,
    pub priority: u8,
    pub ttl_ms: Option<u32>,
    pub delivery_count: u32,
}

/// Properties section (the addressing fields the router reads)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    pub message_id: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
}

/// A fully received message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    header: Option<Header>,
    properties: Option<Properties>,
    application_properties: BTreeMap<String, String>,
    body: Bytes,
    /// First section the codec failed to parse
    corrupt_at: Option<Depth>,
}

impl Message {
    /// Create an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message addressed to `to` with the given body
    pub fn to_address(to: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new()
            .with_properties(Properties {
                to: Some(to.into()),
                ..Properties::default()
            })
            .with_body(body)
    }

    /// Set the header section
    pub fn with_header(mut self, header: Header) -> Self {
        self.header = Some(header);
        self
    }

    /// Set the properties section
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Add an application property
    pub fn with_application_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.application_properties.insert(key.into(), value.into());
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Mark a section as unparseable (set by the codec)
    pub fn with_corrupt_section(mut self, depth: Depth) -> Self {
        self.corrupt_at = Some(match self.corrupt_at {
            Some(existing) => existing.min(depth),
            None => depth,
        });
        self
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn properties(&self) -> Option<&Properties> {
        self.properties.as_ref()
    }

    pub fn application_properties(&self) -> &BTreeMap<String, String> {
        &self.application_properties
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Destination address from the properties section
    pub fn to(&self) -> Option<&str> {
        self.properties.as_ref().and_then(|p| p.to.as_deref())
    }

    /// Validate every section up to and including `depth`
    ///
    /// A missing properties section fails validation at properties depth or
    /// deeper since the router cannot address the message without it.
    pub fn check(&self, depth: Depth) -> Result<(), MessageError> {
        if let Some(corrupt) = self.corrupt_at {
            if corrupt <= depth {
                return Err(MessageError::Malformed(corrupt));
            }
        }
        if depth >= Depth::Properties && self.properties.is_none() {
            return Err(MessageError::MissingSection(Depth::Properties));
        }
        Ok(())
    }

    /// Validate through the properties section and return the destination
    pub fn destination(&self) -> Result<&str, MessageError> {
        self.check(Depth::Properties)?;
        match self.to() {
            Some(to) if !to.is_empty() => Ok(to),
            _ => Err(MessageError::MissingDestination),
        }
    }
}
