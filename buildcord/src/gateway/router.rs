//! Routing of dispatch events to handlers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::rest::DirectoryApi;

/// Prefix of conventionally-named handlers, e.g. `on_guild_create`.
pub const HANDLER_PREFIX: &str = "on_";

/// What a handler gets to work with besides the event payload.
#[derive(Clone)]
pub struct DispatchContext {
    /// Generation the event arrived on.
    pub generation: u64,
    pub directory: Arc<dyn DirectoryApi>,
    /// The configured destination channel.
    pub channel_id: String,
}

/// Handler for one dispatch event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: DispatchContext, payload: Value);
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(DispatchContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, ctx: DispatchContext, payload: Value) {
        (self.0)(ctx, payload).await
    }
}

/// Maps lower-cased event names to handlers.
#[derive(Default)]
pub struct DispatchRouter {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl DispatchRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`. A later registration for the same name replaces
    /// the earlier one.
    pub fn register(&mut self, event: &str, handler: Arc<dyn EventHandler>) {
        let event = event.to_lowercase();
        if self.handlers.insert(event.clone(), handler).is_some() {
            tracing::info!(event = %event, "Replacing dispatch handler");
        } else {
            tracing::debug!(event = %event, "Registered dispatch handler");
        }
    }

    /// Register a closure as handler for `event`.
    pub fn register_fn<F, Fut>(&mut self, event: &str, f: F)
    where
        F: Fn(DispatchContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(event, Arc::new(FnHandler(f)));
    }

    /// Register a handler under a conventional name such as `on_message_create`.
    ///
    /// The event name is whatever follows the prefix.
    pub fn register_named(&mut self, name: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        match name.strip_prefix(HANDLER_PREFIX) {
            Some(event) if !event.is_empty() => {
                self.register(event, handler);
                Ok(())
            }
            _ => Err(Error::Registration(format!(
                "handler name '{}' must look like '{}<event>'",
                name, HANDLER_PREFIX
            ))),
        }
    }

    /// Handler for an already lower-cased event name.
    pub fn get(&self, event: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(event).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
