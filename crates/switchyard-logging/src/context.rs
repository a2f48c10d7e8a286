//! Router context injection for multi-instance logging
//!
//! Several router nodes can share one process (tests, simulations, a
//! container hosting multiple areas). This module keeps the identity of the
//! router a thread is working for in thread-local storage, so log entries
//! can be attributed to the right node.

use std::cell::RefCell;

use switchyard_core::RouterIdentity;
use uuid::Uuid;

/// Router context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterContextData {
    /// Router identity as `area/router`
    pub router: String,
    /// Area the router belongs to
    pub area: String,
    /// Unique instance ID for this router session
    pub instance_id: Uuid,
}

impl RouterContextData {
    fn from_identity(identity: &RouterIdentity, instance_id: Uuid) -> Self {
        Self {
            router: identity.to_string(),
            area: identity.area().to_string(),
            instance_id,
        }
    }

    /// A span carrying this context as fields
    ///
    /// Events recorded inside the span show the router in JSONL output.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "router",
            router = %self.router,
            area = %self.area,
            instance_id = %self.instance_id
        )
    }
}

thread_local! {
    static ROUTER_CONTEXT: RefCell<Option<RouterContextData>> = const { RefCell::new(None) };
}

/// RAII guard for router context
///
/// Sets the router context for the current thread; dropping the guard
/// restores the previous context (if any).
///
/// # Example
///
/// ```ignore
/// use switchyard_logging::context::RouterContextGuard;
///
/// let _guard = RouterContextGuard::new(router.identity());
///
/// // Spans created in this scope carry router = "area0/router0"
/// tracing::info!("Link attached");
/// ```
pub struct RouterContextGuard {
    previous: Option<RouterContextData>,
}

impl RouterContextGuard {
    /// Create a new router context guard with a fresh instance ID
    pub fn new(identity: &RouterIdentity) -> Self {
        Self::with_instance_id(identity, Uuid::new_v4())
    }

    /// Create a guard with a specific instance ID
    ///
    /// Useful to keep one instance ID across every thread serving a router.
    pub fn with_instance_id(identity: &RouterIdentity, instance_id: Uuid) -> Self {
        let previous = Self::current();
        let new_ctx = RouterContextData::from_identity(identity, instance_id);
        ROUTER_CONTEXT.with(|ctx| *ctx.borrow_mut() = Some(new_ctx));
        Self { previous }
    }

    /// Get the current router context (if any)
    pub fn current() -> Option<RouterContextData> {
        ROUTER_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current router (if set)
    pub fn current_router() -> Option<String> {
        Self::current().map(|ctx| ctx.router)
    }

    /// Get the current instance ID (if set)
    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }
}

impl Drop for RouterContextGuard {
    fn drop(&mut self) {
        ROUTER_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with a router context set
///
/// ```ignore
/// with_router_context!(router.identity(), {
///     tracing::info!("Processing delivery");
/// });
/// ```
#[macro_export]
macro_rules! with_router_context {
    ($identity:expr, $body:block) => {{
        let _guard = $crate::context::RouterContextGuard::new($identity);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(router: &str) -> RouterIdentity {
        RouterIdentity::new("east", router).unwrap()
    }

    #[test]
    fn test_router_context_guard() {
        assert!(RouterContextGuard::current().is_none());

        {
            let _guard = RouterContextGuard::new(&identity("r1"));
            let ctx = RouterContextGuard::current().unwrap();
            assert_eq!(ctx.router, "east/r1");
            assert_eq!(ctx.area, "east");
        }

        assert!(RouterContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        {
            let _outer = RouterContextGuard::new(&identity("r1"));
            assert_eq!(RouterContextGuard::current_router().as_deref(), Some("east/r1"));

            {
                let _inner = RouterContextGuard::new(&identity("r2"));
                assert_eq!(RouterContextGuard::current_router().as_deref(), Some("east/r2"));
            }

            assert_eq!(RouterContextGuard::current_router().as_deref(), Some("east/r1"));
        }
        assert!(RouterContextGuard::current_router().is_none());
    }

    #[test]
    fn test_with_instance_id() {
        let instance_id = Uuid::new_v4();
        let _guard = RouterContextGuard::with_instance_id(&identity("r1"), instance_id);
        assert_eq!(RouterContextGuard::current_instance_id(), Some(instance_id));
    }

    #[test]
    fn test_macro_scopes_context() {
        let id = identity("r3");
        let seen = crate::with_router_context!(&id, { RouterContextGuard::current_router() });
        assert_eq!(seen.as_deref(), Some("east/r3"));
        assert!(RouterContextGuard::current().is_none());
    }
}
