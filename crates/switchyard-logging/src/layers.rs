//! Custom tracing layers for Switchyard
//!
//! This module provides the layer that attaches router context to spans and
//! the JSONL formatting layer used for console and file output.

use tracing::{Subscriber, span};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::{LookupSpan, SpanRef};

use crate::config::JsonFields;
use crate::context::{RouterContextData, RouterContextGuard};

/// Layer that attaches router context to spans
///
/// Every span opened while a [`RouterContextGuard`] is active carries a
/// [`RouterContextExtension`], so other layers can attribute events to the
/// router even when they are recorded on another thread.
#[derive(Debug, Default)]
pub struct RouterContextLayer;

impl RouterContextLayer {
    /// Create a new router context layer
    pub fn new() -> Self {
        Self
    }

    /// Router context recorded on a span or its nearest ancestor
    pub fn context_of<S>(span: &SpanRef<'_, S>) -> Option<RouterContextData>
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    {
        span.scope().find_map(|s| {
            s.extensions()
                .get::<RouterContextExtension>()
                .map(|ext| ext.data.clone())
        })
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct RouterContextExtension {
    pub data: RouterContextData,
}

impl<S> Layer<S> for RouterContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let (Some(span), Some(router_ctx)) = (ctx.span(id), RouterContextGuard::current()) {
            span.extensions_mut()
                .insert(RouterContextExtension { data: router_ctx });
        }
    }
}

/// Create a JSONL formatting layer
///
/// Used for file output, and for console output unless pretty printing is
/// requested.
pub fn jsonl_layer<S, W>(writer: W, fields: &JsonFields) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer::<S>()
        .json()
        .with_current_span(fields.current_span)
        .with_span_list(fields.span_list)
        .flatten_event(fields.flatten)
        .with_file(fields.location)
        .with_line_number(fields.location)
        .with_thread_ids(fields.thread)
        .with_thread_names(fields.thread)
        .with_writer(writer)
}
