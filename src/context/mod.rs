use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowCoreError, Result};

pub mod store;

#[derive(Default)]
struct ContextInner {
    data: RwLock<HashMap<String, Value>>,
    conversation_log: RwLock<Vec<String>>,
}

/// Shared execution state for one (tenant, conversation) pair.
///
/// Every task in a flow run reads and writes the same context; clones share
/// the underlying state. Individual operations are safe under concurrent
/// access from the parallel engine, but there is no cross-field atomicity:
/// a reader may observe a log append without the matching data write unless
/// the caller orders them.
#[derive(Clone)]
pub struct AgentContext {
    tenant_id: Arc<str>,
    conversation_id: Arc<str>,
    inner: Arc<ContextInner>,
}

impl AgentContext {
    pub fn new(tenant_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into().into(),
            conversation_id: conversation_id.into().into(),
            inner: Arc::new(ContextInner::default()),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Stores a value. Null values are ignored, so a `put` of `Value::Null`
    /// never shadows or creates a key.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if key.is_empty() || value.is_null() {
            return;
        }
        self.inner.data.write().insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.data.read().get(key).cloned()
    }

    /// Typed read: absent key is `Ok(None)`, a present but unconvertible
    /// value is a `TypeMismatch` error.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|_| {
                FlowCoreError::TypeMismatch {
                    key: key.to_string(),
                    expected: std::any::type_name::<T>().to_string(),
                }
            }),
        }
    }

    /// Merges a map into the data store, overwriting existing keys.
    /// Null values are skipped like in `put`.
    pub fn put_all(&self, values: &HashMap<String, Value>) {
        if values.is_empty() {
            return;
        }
        let mut data = self.inner.data.write();
        for (key, value) in values {
            if !key.is_empty() && !value.is_null() {
                data.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn remove(&self, key: &str) {
        self.inner.data.write().remove(key);
    }

    /// Clears the key/value store, preserving the conversation log.
    pub fn clear_data(&self) {
        self.inner.data.write().clear();
    }

    pub fn clear_all(&self) {
        self.inner.data.write().clear();
        self.inner.conversation_log.write().clear();
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.data.read().contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn add_message(&self, message: impl Into<String>) {
        self.inner.conversation_log.write().push(message.into());
    }

    pub fn conversation_log(&self) -> Vec<String> {
        self.inner.conversation_log.read().clone()
    }

    /// Point-in-time copy of the data map, used by the condition evaluator
    /// and by stores that serialize the context.
    pub fn data_snapshot(&self) -> HashMap<String, Value> {
        self.inner.data.read().clone()
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            tenant_id: self.tenant_id.to_string(),
            conversation_id: self.conversation_id.to_string(),
            data: self.data_snapshot(),
            conversation_log: self.conversation_log(),
        }
    }

    pub fn from_snapshot(snapshot: ContextSnapshot) -> Self {
        let ctx = AgentContext::new(snapshot.tenant_id, snapshot.conversation_id);
        *ctx.inner.data.write() = snapshot.data;
        *ctx.inner.conversation_log.write() = snapshot.conversation_log;
        ctx
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("tenant_id", &self.tenant_id)
            .field("conversation_id", &self.conversation_id)
            .field("data_size", &self.size())
            .field("log_size", &self.inner.conversation_log.read().len())
            .finish()
    }
}

/// Serializable form of a context, used by durable stores for lossless
/// round trips of data and conversation log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub tenant_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub conversation_log: Vec<String>,
}
