use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// One completion request assembled by an LLM agent. `prompt` is the full
/// assembled text; `user` is the raw user message it was built from.
#[derive(Clone, Debug, Default)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
    pub prompt: String,
    /// Agent config merged with flow-level overrides from the context.
    pub options: HashMap<String, Value>,
}

#[derive(Clone, Debug)]
pub struct LlmResponse {
    pub content: String,
}

/// The seam to external LLM providers; wire formats live behind it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;
}

pub type DynLlmClient = Arc<dyn LlmClient>;

/// Offline client for tests and local runs: echoes the user message.
#[derive(Default, Clone)]
pub struct LocalEchoClient;

#[async_trait]
impl LlmClient for LocalEchoClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        Ok(LlmResponse {
            content: format!("[Echo] {}", request.user),
        })
    }
}
