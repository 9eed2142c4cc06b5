use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::factory::AgentConstructorRegistry;
use super::{Agent, AgentExtension, AgentInvocation};
use crate::context::AgentContext;
use crate::error::Result;
use crate::llm::{DynLlmClient, LlmRequest};
use crate::model::AgentDefinition;

/// Returns its input unchanged: the `msg` input when present, otherwise
/// the whole resolved input map. Useful for wiring and tests.
pub struct EchoAgent {
    name: String,
}

impl EchoAgent {
    pub fn new(definition: &AgentDefinition) -> Self {
        let name = if definition.name.is_empty() {
            definition.agent_id.clone()
        } else {
            definition.name.clone()
        };
        Self { name }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        invocation: &mut AgentInvocation,
        _context: &AgentContext,
    ) -> Result<()> {
        let result = match invocation.input("msg") {
            Some(value) => value.clone(),
            None => Value::Object(
                invocation
                    .inputs()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        };
        invocation.set_result(result);
        Ok(())
    }
}

/// LLM-backed agent that runs its enabled extensions against the user
/// message, then assembles a prompt from the system prompt, the
/// conversation log, and the extension results.
pub struct ExtensibleLlmAgent {
    definition: AgentDefinition,
    extensions: Vec<Arc<dyn AgentExtension>>,
    client: DynLlmClient,
}

impl ExtensibleLlmAgent {
    pub fn new(
        definition: AgentDefinition,
        extensions: Vec<Arc<dyn AgentExtension>>,
        client: DynLlmClient,
    ) -> Self {
        Self {
            definition,
            extensions,
            client,
        }
    }
}

#[async_trait]
impl Agent for ExtensibleLlmAgent {
    fn name(&self) -> &str {
        &self.definition.name
    }

    async fn handle(
        &self,
        invocation: &mut AgentInvocation,
        context: &AgentContext,
    ) -> Result<()> {
        let user = invocation.require_str("user_input")?.to_string();
        context.add_message(format!("User: {user}"));

        let mut tool_results = serde_json::Map::new();
        for extension in &self.extensions {
            let result = extension.execute(&user, context).await?;
            tool_results.insert(extension.name().to_string(), result);
        }

        let prompt = format!(
            "{}\n\nConversation so far:\n{}\n\nTools:\n{}\n\nUser: {}",
            self.definition.system_prompt(),
            context.conversation_log().join("\n"),
            Value::Object(tool_results),
            user
        );

        // Agent config first, flow-level context values override.
        let mut options: std::collections::HashMap<String, Value> = self
            .definition
            .config()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        options.extend(context.data_snapshot());

        let response = self
            .client
            .complete(LlmRequest {
                system: self.definition.system_prompt().to_string(),
                user,
                prompt,
                options,
            })
            .await?;

        context.add_message(format!("Agent: {}", response.content));
        invocation.set_result(Value::String(response.content));
        Ok(())
    }
}

/// Registers the constructors shipped with the engine itself.
pub fn register_builtin_agents(registry: &mut AgentConstructorRegistry) {
    registry.register(
        "echo",
        Arc::new(|definition: &AgentDefinition, _extensions| {
            Ok(Arc::new(EchoAgent::new(definition)) as Arc<dyn Agent>)
        }),
    );
}
