//! Address classification
//!
//! Every destination address presented to a router is reduced to a
//! [`HashKey`] before it touches the address table. The key space is split by
//! a one-character class prefix:
//!
//! | Address                               | Hash key    | Handler | Remote |
//! |---------------------------------------|-------------|---------|--------|
//! | `_local/<local>`                      | `L<local>`  | yes     | no     |
//! | `_topo/<area>/<router>/<local>`       | `A<area>`   | no      | yes    |
//! | `_topo/<my-area>/<router>/<local>`    | `R<router>` | no      | yes    |
//! | `_topo/<my-area>/<my-router>/<local>` | `L<local>`  | yes     | yes    |
//! | `_topo/<area>/all/<local>`            | `A<area>`   | no      | yes    |
//! | `_topo/<my-area>/all/<local>`         | `L<local>`  | yes     | yes    |
//! | `_topo/all/all/<local>`               | `L<local>`  | yes     | yes    |
//! | `<mobile>`                            | `M<mobile>` | yes     | yes    |
//!
//! Classification is pure. Registration and lookup go through the same
//! function, otherwise addresses silently fail to route.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

const LOCAL_PREFIX: &str = "_local/";
const TOPO_PREFIX: &str = "_topo/";
const WILDCARD: &str = "all";

/// Area and router identifiers of a router node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouterIdentity {
    area: String,
    router_id: String,
}

impl RouterIdentity {
    /// Create a router identity
    ///
    /// Both parts must be non-empty, must not contain `/`, and must not be the
    /// `all` wildcard.
    pub fn new(
        area: impl Into<String>,
        router_id: impl Into<String>,
    ) -> Result<Self, AddressError> {
        let area = area.into();
        let router_id = router_id.into();

        for (what, value) in [("area", &area), ("router id", &router_id)] {
            if value.is_empty() {
                return Err(AddressError::InvalidIdentity(format!("{} is empty", what)));
            }
            if value.contains('/') {
                return Err(AddressError::InvalidIdentity(format!(
                    "{} '{}' contains '/'",
                    what, value
                )));
            }
            if value == WILDCARD {
                return Err(AddressError::InvalidIdentity(format!(
                    "{} may not be the '{}' wildcard",
                    what, WILDCARD
                )));
            }
        }

        Ok(Self { area, router_id })
    }

    /// The area this router belongs to
    pub fn area(&self) -> &str {
        &self.area
    }

    /// This router's id within its area
    pub fn router_id(&self) -> &str {
        &self.router_id
    }
}

impl Display for RouterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.area, self.router_id)
    }
}

/// Hash-key space an address falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressClass {
    /// Delivered on this node (`L`)
    Local,
    /// Another area (`A`)
    Area,
    /// Another router in this area (`R`)
    Router,
    /// Not tied to a fixed node (`M`)
    Mobile,
}

impl AddressClass {
    /// The key prefix for this class
    pub fn prefix(self) -> char {
        match self {
            AddressClass::Local => 'L',
            AddressClass::Area => 'A',
            AddressClass::Router => 'R',
            AddressClass::Mobile => 'M',
        }
    }

    /// Parse a key prefix
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'L' => Some(AddressClass::Local),
            'A' => Some(AddressClass::Area),
            'R' => Some(AddressClass::Router),
            'M' => Some(AddressClass::Mobile),
            _ => None,
        }
    }
}

/// Classified address-table key: class prefix followed by the suffix
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HashKey(String);

impl HashKey {
    /// Build a key from its class and suffix
    pub fn new(class: AddressClass, suffix: &str) -> Self {
        let mut key = String::with_capacity(suffix.len() + 1);
        key.push(class.prefix());
        key.push_str(suffix);
        Self(key)
    }

    /// The class encoded in the key prefix
    pub fn class(&self) -> AddressClass {
        self.0
            .chars()
            .next()
            .and_then(AddressClass::from_prefix)
            .unwrap_or(AddressClass::Mobile)
    }

    /// The key without its class prefix
    pub fn suffix(&self) -> &str {
        self.0.get(1..).unwrap_or("")
    }

    /// The full key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for HashKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of classifying an address against a router identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedAddress {
    /// Address table key
    pub hash_key: HashKey,
    /// Invoke the in-process handler on receive
    pub invoke_handler: bool,
    /// Forward toward a remote next hop on receive
    pub forward_remote: bool,
}

impl ClassifiedAddress {
    fn local(suffix: &str, forward_remote: bool) -> Self {
        Self {
            hash_key: HashKey::new(AddressClass::Local, suffix),
            invoke_handler: true,
            forward_remote,
        }
    }

    fn transit(class: AddressClass, suffix: &str) -> Self {
        Self {
            hash_key: HashKey::new(class, suffix),
            invoke_handler: false,
            forward_remote: true,
        }
    }

    fn mobile(address: &str) -> Self {
        Self {
            hash_key: HashKey::new(AddressClass::Mobile, address),
            invoke_handler: true,
            forward_remote: true,
        }
    }

    /// The class of the hash key
    pub fn class(&self) -> AddressClass {
        self.hash_key.class()
    }
}

/// Strip an `amqp://host/` or `amqp:/` scheme and one leading `/`
fn strip_scheme(address: &str) -> &str {
    let path = if let Some(rest) = address.strip_prefix("amqp://") {
        rest.split_once('/').map(|(_, path)| path).unwrap_or("")
    } else if let Some(rest) = address.strip_prefix("amqp:") {
        rest
    } else {
        address
    };
    path.strip_prefix('/').unwrap_or(path)
}

/// Classify an address for the router with the given identity
///
/// Unrecognized or incomplete prefixes fall back to the mobile key space.
pub fn classify(
    address: &str,
    identity: &RouterIdentity,
) -> Result<ClassifiedAddress, AddressError> {
    let address = strip_scheme(address);
    if address.is_empty() {
        return Err(AddressError::Empty);
    }

    if let Some(local) = address.strip_prefix(LOCAL_PREFIX) {
        if !local.is_empty() {
            return Ok(ClassifiedAddress::local(local, false));
        }
    }

    if let Some(rest) = address.strip_prefix(TOPO_PREFIX) {
        let mut parts = rest.splitn(3, '/');
        if let (Some(area), Some(router), Some(local)) = (parts.next(), parts.next(), parts.next())
        {
            if !area.is_empty() && !router.is_empty() && !local.is_empty() {
                let own_area = area == WILDCARD || area == identity.area();
                if !own_area {
                    return Ok(ClassifiedAddress::transit(AddressClass::Area, area));
                }
                if router == WILDCARD || router == identity.router_id() {
                    return Ok(ClassifiedAddress::local(local, true));
                }
                return Ok(ClassifiedAddress::transit(AddressClass::Router, router));
            }
        }
    }

    Ok(ClassifiedAddress::mobile(address))
}

/// Address string used when registering an in-process handler
///
/// A bare name registered as local lives in the `_local/` space, so that a
/// handler registered as `stats` and one registered as `_local/stats` share
/// the key `Lstats`.
pub fn registration_address(is_local: bool, address: &str) -> String {
    let bare = strip_scheme(address);
    if is_local && !bare.starts_with(LOCAL_PREFIX) && !bare.starts_with(TOPO_PREFIX) {
        format!("{}{}", LOCAL_PREFIX, bare)
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> RouterIdentity {
        RouterIdentity::new("A0", "R0").unwrap()
    }

    fn key(address: &str) -> String {
        classify(address, &me()).unwrap().hash_key.to_string()
    }

    #[test]
    fn test_local_addresses() {
        let c = classify("_local/stats", &me()).unwrap();
        assert_eq!(c.hash_key.as_str(), "Lstats");
        assert!(c.invoke_handler);
        assert!(!c.forward_remote);
    }

    #[test]
    fn test_topological_addresses() {
        assert_eq!(key("_topo/A9/R3/svc"), "AA9");
        assert_eq!(key("_topo/A9/all/svc"), "AA9");
        assert_eq!(key("_topo/A0/R3/svc"), "RR3");
        assert_eq!(key("_topo/A0/R0/svc"), "Lsvc");
        assert_eq!(key("_topo/A0/all/svc"), "Lsvc");
        assert_eq!(key("_topo/all/all/svc"), "Lsvc");

        let own = classify("_topo/A0/R0/svc", &me()).unwrap();
        assert!(own.invoke_handler);
        assert!(own.forward_remote);

        let other = classify("_topo/A0/R3/svc", &me()).unwrap();
        assert!(!other.invoke_handler);
        assert!(other.forward_remote);
        assert_eq!(other.class(), AddressClass::Router);
    }

    #[test]
    fn test_local_part_may_contain_slashes() {
        assert_eq!(key("_topo/A0/R0/a/b/c"), "La/b/c");
        assert_eq!(key("_local/a/b"), "La/b");
    }

    #[test]
    fn test_mobile_fallback() {
        assert_eq!(key("orders"), "Morders");
        assert_eq!(key("_topo/A0/R0"), "M_topo/A0/R0");
        assert_eq!(key("_topo//R0/x"), "M_topo//R0/x");
        assert_eq!(key("_local/"), "M_local/");
        assert_eq!(classify("orders", &me()).unwrap().class(), AddressClass::Mobile);
    }

    #[test]
    fn test_scheme_and_host_are_ignored() {
        assert_eq!(key("amqp://broker.example:5672/_local/stats"), "Lstats");
        assert_eq!(key("amqp:/orders"), "Morders");
        assert_eq!(key("/orders"), "Morders");
    }

    #[test]
    fn test_empty_address() {
        assert_eq!(classify("", &me()), Err(AddressError::Empty));
        assert_eq!(classify("amqp://host", &me()), Err(AddressError::Empty));
    }

    #[test]
    fn test_classification_is_deterministic() {
        for address in ["_local/x", "_topo/A1/R1/x", "_topo/A0/R1/x", "mobile/x", "x"] {
            assert_eq!(classify(address, &me()), classify(address, &me()));
        }
    }

    #[test]
    fn test_hash_key_parts() {
        let key = HashKey::new(AddressClass::Router, "R7");
        assert_eq!(key.class(), AddressClass::Router);
        assert_eq!(key.suffix(), "R7");
        assert_eq!(key.as_str(), "RR7");
    }

    #[test]
    fn test_registration_address() {
        assert_eq!(registration_address(true, "stats"), "_local/stats");
        assert_eq!(registration_address(true, "_local/stats"), "_local/stats");
        assert_eq!(registration_address(true, "_topo/A0/R0/x"), "_topo/A0/R0/x");
        assert_eq!(registration_address(false, "stats"), "stats");

        let a = classify(&registration_address(true, "stats"), &me()).unwrap();
        let b = classify("_local/stats", &me()).unwrap();
        assert_eq!(a.hash_key, b.hash_key);
    }

    #[test]
    fn test_router_identity_validation() {
        assert!(RouterIdentity::new("A0", "R0").is_ok());
        assert!(RouterIdentity::new("", "R0").is_err());
        assert!(RouterIdentity::new("A0", "a/b").is_err());
        assert!(RouterIdentity::new("all", "R0").is_err());
        assert_eq!(me().to_string(), "A0/R0");
    }
}
