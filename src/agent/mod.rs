use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::AgentContext;
use crate::error::{FlowCoreError, Result};

pub mod builtin;
pub mod factory;
pub mod registry;

/// Carries one task's resolved inputs into an agent, plus the mutable slot
/// the agent writes its result into.
#[derive(Clone, Debug, Default)]
pub struct AgentInvocation {
    inputs: HashMap<String, Value>,
    result: Option<Value>,
}

impl AgentInvocation {
    pub fn new(inputs: HashMap<String, Value>) -> Self {
        Self {
            inputs,
            result: None,
        }
    }

    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.inputs
    }

    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }

    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.input_str(key).ok_or_else(|| {
            FlowCoreError::Other(anyhow::anyhow!("missing required string input `{key}`"))
        })
    }

    pub fn set_result(&mut self, result: Value) {
        self.result = Some(result);
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn take_result(self) -> Option<Value> {
        self.result
    }
}

/// The unit of work a task delegates to.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, invocation: &mut AgentInvocation, context: &AgentContext)
        -> Result<()>;
}

impl std::fmt::Debug for dyn Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent").field("name", &self.name()).finish()
    }
}

/// A named capability an agent can invoke by name, e.g. a retrieval or
/// scoring step run before the main prompt.
#[async_trait]
pub trait AgentExtension: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, input: &str, context: &AgentContext) -> Result<Value>;
}
