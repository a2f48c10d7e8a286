//! Routing error types
//!
//! Re-exports core errors and adds router-specific errors.

use thiserror::Error;

use switchyard_core::{AddressError, HashKey, SwitchyardError};

/// Errors returned by the router's administrative API
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] SwitchyardError),

    /// Address could not be classified
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    /// An address with the same hash key is already registered
    #[error("Address already registered: {0}")]
    DuplicateAddress(HashKey),

    /// No address matches the destination
    #[error("No route to {0}")]
    NoRoute(HashKey),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for RoutingError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<std::io::Error> for RoutingError {
    fn from(e: std::io::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::AddressClass;

    #[test]
    fn test_error_display() {
        let key = HashKey::new(AddressClass::Local, "stats");
        let err = RoutingError::DuplicateAddress(key.clone());
        assert!(format!("{}", err).contains("Lstats"));

        let err = RoutingError::NoRoute(key);
        assert!(format!("{}", err).contains("No route"));
    }

    #[test]
    fn test_error_conversions() {
        let err: RoutingError = AddressError::Empty.into();
        assert!(matches!(err, RoutingError::InvalidAddress(_)));

        let err: RoutingError = SwitchyardError::from(AddressError::Empty).into();
        assert!(matches!(err, RoutingError::Core(_)));

        let err: RoutingError = std::io::Error::other("missing").into();
        assert!(matches!(err, RoutingError::Config(_)));
    }
}
