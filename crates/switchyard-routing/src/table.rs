//! Address table
//!
//! The [`AddressTable`] maps classified [`HashKey`]s to [`Address`] records.
//! It owns no messages, only routing metadata, and is never shared on its
//! own: the router keeps it inside its single lock, so lookup-then-use and
//! lookup-then-remove are always done under that lock.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use switchyard_core::{HashKey, LinkId, MessageHandler, NextHop};

use crate::error::{RoutingError, RoutingResult};

/// A routing destination
pub struct Address {
    hash_key: HashKey,
    /// Distinguishes successive records under the same key
    registration: u64,
    is_local: bool,
    /// In-process consumer
    handler: Option<Arc<dyn MessageHandler>>,
    /// Locally attached consumer link (at most one)
    local_link: Option<LinkId>,
    /// Remote router the address is reachable through
    next_hop: Option<NextHop>,
}

impl Address {
    fn new(hash_key: HashKey, registration: u64) -> Self {
        Self {
            hash_key,
            registration,
            is_local: false,
            handler: None,
            local_link: None,
            next_hop: None,
        }
    }

    pub fn hash_key(&self) -> &HashKey {
        &self.hash_key
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn handler(&self) -> Option<&Arc<dyn MessageHandler>> {
        self.handler.as_ref()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn local_link(&self) -> Option<LinkId> {
        self.local_link
    }

    pub fn next_hop(&self) -> Option<&NextHop> {
        self.next_hop.as_ref()
    }

    /// Handle for the administrative API
    pub fn handle(&self) -> AddressHandle {
        AddressHandle {
            hash_key: self.hash_key.clone(),
            registration: self.registration,
        }
    }

    pub(crate) fn set_handler(&mut self, handler: Option<Arc<dyn MessageHandler>>) {
        self.handler = handler;
    }

    pub(crate) fn bind_link(&mut self, link: LinkId) {
        self.local_link = Some(link);
    }

    /// Unbind `link` if it is the bound consumer; returns whether it was
    pub(crate) fn unbind_link(&mut self, link: LinkId) -> bool {
        if self.local_link == Some(link) {
            self.local_link = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_next_hop(&mut self, next_hop: Option<NextHop>) {
        self.next_hop = next_hop;
    }

    /// Whether nothing keeps this address alive
    pub fn is_unreferenced(&self) -> bool {
        self.handler.is_none() && self.local_link.is_none() && self.next_hop.is_none()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address")
            .field("hash_key", &self.hash_key)
            .field("is_local", &self.is_local)
            .field("handler", &self.handler.is_some())
            .field("local_link", &self.local_link)
            .field("next_hop", &self.next_hop)
            .finish()
    }
}

/// Opaque reference to a registered address
///
/// Validated against the table on use; a handle whose record was removed
/// (and possibly replaced) is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressHandle {
    hash_key: HashKey,
    registration: u64,
}

impl AddressHandle {
    pub fn hash_key(&self) -> &HashKey {
        &self.hash_key
    }
}

/// Hash table from classified key to address record
#[derive(Debug, Default)]
pub struct AddressTable {
    addresses: HashMap<HashKey, Address>,
    next_registration: u64,
}

impl AddressTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn next_registration(&mut self) -> u64 {
        self.next_registration += 1;
        self.next_registration
    }

    /// Register an address with an optional in-process handler
    ///
    /// Fails if the key is already present.
    pub fn register(
        &mut self,
        hash_key: HashKey,
        is_local: bool,
        handler: Option<Arc<dyn MessageHandler>>,
    ) -> RoutingResult<AddressHandle> {
        let registration = self.next_registration();
        match self.addresses.entry(hash_key) {
            Entry::Occupied(entry) => Err(RoutingError::DuplicateAddress(entry.key().clone())),
            Entry::Vacant(entry) => {
                let mut address = Address::new(entry.key().clone(), registration);
                address.is_local = is_local;
                address.handler = handler;
                Ok(entry.insert(address).handle())
            }
        }
    }

    /// Look up an address
    pub fn lookup(&self, hash_key: &HashKey) -> Option<&Address> {
        self.addresses.get(hash_key)
    }

    /// Look up an address for modification
    pub fn lookup_mut(&mut self, hash_key: &HashKey) -> Option<&mut Address> {
        self.addresses.get_mut(hash_key)
    }

    /// Look up a handle's address, if the handle is still current
    pub fn resolve_mut(&mut self, handle: &AddressHandle) -> Option<&mut Address> {
        self.addresses
            .get_mut(&handle.hash_key)
            .filter(|address| address.registration == handle.registration)
    }

    /// Return the address for `hash_key`, creating an empty one if needed
    pub fn get_or_create(&mut self, hash_key: &HashKey) -> &mut Address {
        let next_registration = &mut self.next_registration;
        self.addresses.entry(hash_key.clone()).or_insert_with(|| {
            *next_registration += 1;
            Address::new(hash_key.clone(), *next_registration)
        })
    }

    /// Remove an address
    pub fn remove(&mut self, hash_key: &HashKey) -> Option<Address> {
        self.addresses.remove(hash_key)
    }

    /// Remove an address if nothing references it; returns whether it was removed
    pub fn remove_if_unreferenced(&mut self, hash_key: &HashKey) -> bool {
        if self.addresses.get(hash_key).is_some_and(Address::is_unreferenced) {
            self.addresses.remove(hash_key);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, hash_key: &HashKey) -> bool {
        self.addresses.contains_key(hash_key)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<HashKey> {
        let mut keys: Vec<_> = self.addresses.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{AddressClass, Message};

    fn key(suffix: &str) -> HashKey {
        HashKey::new(AddressClass::Local, suffix)
    }

    fn noop_handler() -> Arc<dyn MessageHandler> {
        Arc::new(|_: &Message| {})
    }

    #[test]
    fn test_register_and_lookup() {
        let mut table = AddressTable::new();
        let handle = table.register(key("stats"), true, Some(noop_handler())).unwrap();

        assert_eq!(handle.hash_key(), &key("stats"));
        let address = table.lookup(&key("stats")).unwrap();
        assert!(address.is_local());
        assert!(address.has_handler());
        assert!(address.local_link().is_none());
    }

    #[test]
    fn test_register_duplicate() {
        let mut table = AddressTable::new();
        table.register(key("stats"), true, None).unwrap();

        let err = table.register(key("stats"), false, None).unwrap_err();
        assert!(matches!(err, RoutingError::DuplicateAddress(k) if k == key("stats")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut table = AddressTable::new();
        table.get_or_create(&key("q")).bind_link(LinkId(1));
        let again = table.get_or_create(&key("q"));
        assert_eq!(again.local_link(), Some(LinkId(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut table = AddressTable::new();
        table.get_or_create(&key("q"));
        assert!(table.remove(&key("q")).is_some());
        assert!(table.lookup(&key("q")).is_none());
        assert!(table.remove(&key("q")).is_none());
    }

    #[test]
    fn test_remove_if_unreferenced() {
        let mut table = AddressTable::new();
        table.register(key("with-handler"), true, Some(noop_handler())).unwrap();
        table.get_or_create(&key("bare"));

        assert!(!table.remove_if_unreferenced(&key("with-handler")));
        assert!(table.remove_if_unreferenced(&key("bare")));
        assert_eq!(table.keys(), vec![key("with-handler")]);
    }

    #[test]
    fn test_unbind_only_bound_link() {
        let mut table = AddressTable::new();
        let address = table.get_or_create(&key("q"));
        address.bind_link(LinkId(1));

        assert!(!address.unbind_link(LinkId(2)));
        assert_eq!(address.local_link(), Some(LinkId(1)));
        assert!(address.unbind_link(LinkId(1)));
        assert!(address.is_unreferenced());
    }

    #[test]
    fn test_stale_handle() {
        let mut table = AddressTable::new();
        let old = table.register(key("q"), true, None).unwrap();
        table.remove(&key("q"));
        let new = table.register(key("q"), true, None).unwrap();

        assert!(table.resolve_mut(&old).is_none());
        assert!(table.resolve_mut(&new).is_some());
    }
}
