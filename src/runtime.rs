use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::context::store::ContextStore;
use crate::context::AgentContext;
use crate::error::Result;
use crate::executor::FlowExecutor;
use crate::model::Flow;

/// Wraps flow execution with context lifecycle: fetch-or-create the
/// (tenant, conversation) context, merge caller globals, execute, and
/// persist fire-and-forget.
///
/// Context mutations made before a failing task are not rolled back; the
/// caller decides whether to persist the partial state it got back.
pub struct FlowRuntime {
    executor: FlowExecutor,
    store: Arc<dyn ContextStore>,
}

impl FlowRuntime {
    pub fn new(executor: FlowExecutor, store: Arc<dyn ContextStore>) -> Self {
        Self { executor, store }
    }

    pub async fn run(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        flow: Arc<Flow>,
        globals: &HashMap<String, Value>,
    ) -> Result<AgentContext> {
        let context = self.store.get_or_create(tenant_id, conversation_id).await?;
        context.put_all(globals);

        self.executor.run(Arc::clone(&flow), &context).await?;
        self.store.save_async(tenant_id, conversation_id, &context);

        tracing::info!(
            flow = %flow.name,
            conversation_id,
            "flow executed"
        );
        Ok(context)
    }

    /// The current context for a conversation, creating it if absent.
    pub async fn context(&self, tenant_id: &str, conversation_id: &str) -> Result<AgentContext> {
        self.store.get_or_create(tenant_id, conversation_id).await
    }

    pub fn store(&self) -> Arc<dyn ContextStore> {
        Arc::clone(&self.store)
    }
}
