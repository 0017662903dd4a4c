//! Built-in dispatch handlers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::router::{DispatchContext, DispatchRouter, EventHandler};

/// Logs the guilds the bot is a member of as the gateway announces them.
pub struct GuildCreate;

#[async_trait]
impl EventHandler for GuildCreate {
    async fn handle(&self, ctx: DispatchContext, payload: Value) {
        let id = payload.get("id").and_then(Value::as_str).unwrap_or("?");
        let name = payload.get("name").and_then(Value::as_str).unwrap_or("?");
        tracing::info!(generation = ctx.generation, guild_id = id, "Joined guild {}", name);
    }
}

/// Router with the built-in handlers registered.
pub fn default_router() -> DispatchRouter {
    let mut router = DispatchRouter::new();
    router.register("guild_create", Arc::new(GuildCreate));
    router
}
