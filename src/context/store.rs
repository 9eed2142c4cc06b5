use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::AgentContext;
use crate::error::Result;

/// Storage abstraction for execution contexts, keyed by (tenant, conversation).
///
/// `get_or_create` never returns an absent context; concurrent calls for the
/// same key must resolve to the same logical context. `save_async` is
/// fire-and-forget: failures are logged, never raised to the caller.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get_or_create(&self, tenant_id: &str, conversation_id: &str) -> Result<AgentContext>;
    async fn save(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        context: &AgentContext,
    ) -> Result<()>;
    fn save_async(&self, tenant_id: &str, conversation_id: &str, context: &AgentContext);
    async fn delete(&self, tenant_id: &str, conversation_id: &str) -> Result<()>;
    /// Removes every context belonging to the tenant.
    async fn clear_tenant(&self, tenant_id: &str) -> Result<()>;
}

fn composite_key(tenant_id: &str, conversation_id: &str) -> String {
    format!("{tenant_id}:{conversation_id}")
}

/// Default in-memory store. Contexts live for the process lifetime and are
/// never persisted; contexts handed out by `get_or_create` share state with
/// the stored entry, so `save` is effectively a no-op refresh.
#[derive(Default)]
pub struct InMemoryContextStore {
    registry: RwLock<HashMap<String, AgentContext>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get_or_create(&self, tenant_id: &str, conversation_id: &str) -> Result<AgentContext> {
        // Single write lock gives compute-if-absent atomicity: two racing
        // callers always observe the same stored context.
        let mut registry = self.registry.write();
        let ctx = registry
            .entry(composite_key(tenant_id, conversation_id))
            .or_insert_with(|| AgentContext::new(tenant_id, conversation_id));
        Ok(ctx.clone())
    }

    async fn save(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        context: &AgentContext,
    ) -> Result<()> {
        self.registry
            .write()
            .insert(composite_key(tenant_id, conversation_id), context.clone());
        tracing::debug!(tenant_id, conversation_id, "context saved");
        Ok(())
    }

    fn save_async(&self, tenant_id: &str, conversation_id: &str, context: &AgentContext) {
        // The map write is lock-bound and cheap, so the async variant
        // completes inline.
        self.registry
            .write()
            .insert(composite_key(tenant_id, conversation_id), context.clone());
        tracing::debug!(tenant_id, conversation_id, "context saved");
    }

    async fn delete(&self, tenant_id: &str, conversation_id: &str) -> Result<()> {
        self.registry
            .write()
            .remove(&composite_key(tenant_id, conversation_id));
        Ok(())
    }

    async fn clear_tenant(&self, tenant_id: &str) -> Result<()> {
        let prefix = format!("{tenant_id}:");
        let mut registry = self.registry.write();
        let before = registry.len();
        registry.retain(|key, _| !key.starts_with(&prefix));
        tracing::info!(
            tenant_id,
            cleared = before - registry.len(),
            "cleared tenant contexts"
        );
        Ok(())
    }
}

#[cfg(feature = "redis-store")]
pub mod redis {
    use super::*;
    use crate::context::ContextSnapshot;
    use crate::error::FlowCoreError;
    use ::redis::AsyncCommands;

    /// Durable store: one serialized snapshot per (tenant, conversation)
    /// key, overwritten on save. Data and conversation log round-trip
    /// losslessly through `ContextSnapshot`.
    pub struct RedisContextStore {
        client: ::redis::Client,
        key_prefix: String,
    }

    impl RedisContextStore {
        pub fn new(client: ::redis::Client) -> Self {
            Self {
                client,
                key_prefix: "flowcore:ctx".to_string(),
            }
        }

        fn key(&self, tenant_id: &str, conversation_id: &str) -> String {
            format!("{}:{}:{}", self.key_prefix, tenant_id, conversation_id)
        }

        async fn write_snapshot(
            client: &::redis::Client,
            key: String,
            snapshot: ContextSnapshot,
        ) -> Result<()> {
            let json = serde_json::to_string(&snapshot)
                .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
            let mut conn = client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
            let _: () = conn
                .set(key, json)
                .await
                .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
            Ok(())
        }
    }

    #[async_trait]
    impl ContextStore for RedisContextStore {
        async fn get_or_create(
            &self,
            tenant_id: &str,
            conversation_id: &str,
        ) -> Result<AgentContext> {
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
            let stored: Option<String> = conn
                .get(self.key(tenant_id, conversation_id))
                .await
                .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
            match stored {
                Some(json) => {
                    let snapshot: ContextSnapshot = serde_json::from_str(&json)
                        .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
                    Ok(AgentContext::from_snapshot(snapshot))
                }
                None => Ok(AgentContext::new(tenant_id, conversation_id)),
            }
        }

        async fn save(
            &self,
            tenant_id: &str,
            conversation_id: &str,
            context: &AgentContext,
        ) -> Result<()> {
            Self::write_snapshot(
                &self.client,
                self.key(tenant_id, conversation_id),
                context.snapshot(),
            )
            .await
        }

        fn save_async(&self, tenant_id: &str, conversation_id: &str, context: &AgentContext) {
            let client = self.client.clone();
            let key = self.key(tenant_id, conversation_id);
            let snapshot = context.snapshot();
            let tenant = tenant_id.to_string();
            let conversation = conversation_id.to_string();
            tokio::spawn(async move {
                if let Err(error) = Self::write_snapshot(&client, key, snapshot).await {
                    tracing::warn!(
                        tenant_id = %tenant,
                        conversation_id = %conversation,
                        %error,
                        "async context save failed"
                    );
                }
            });
        }

        async fn delete(&self, tenant_id: &str, conversation_id: &str) -> Result<()> {
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
            let _: () = conn
                .del(self.key(tenant_id, conversation_id))
                .await
                .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
            Ok(())
        }

        async fn clear_tenant(&self, tenant_id: &str) -> Result<()> {
            let mut scan_conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
            let pattern = format!("{}:{}:*", self.key_prefix, tenant_id);
            let keys: Vec<String> = {
                let mut iter = scan_conn
                    .scan_match::<_, String>(pattern)
                    .await
                    .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
                let mut keys = Vec::new();
                while let Some(key) = iter.next_item().await {
                    keys.push(key.map_err(|e| FlowCoreError::Persistence(e.to_string()))?);
                }
                keys
            };
            if keys.is_empty() {
                return Ok(());
            }
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
            let _: () = conn
                .del(keys)
                .await
                .map_err(|e| FlowCoreError::Persistence(e.to_string()))?;
            Ok(())
        }
    }
}
