use std::collections::HashMap;
use std::sync::Arc;

use super::builtin::ExtensibleLlmAgent;
use super::registry::AgentExtensionRegistry;
use super::{Agent, AgentExtension};
use crate::error::{FlowCoreError, Result};
use crate::llm::LlmClient;
use crate::model::AgentDefinition;
use crate::plugin::PluginRegistry;

/// One way of turning an agent definition into a live agent. The factory
/// asks each builder `supports(type)` in registration order and uses the
/// first match.
pub trait AgentBuilder: Send + Sync {
    fn supports(&self, agent_type: &str) -> bool;
    fn build(&self, definition: &AgentDefinition) -> Result<Arc<dyn Agent>>;
}

pub struct AgentFactory {
    builders: Vec<Arc<dyn AgentBuilder>>,
}

impl AgentFactory {
    pub fn new(builders: Vec<Arc<dyn AgentBuilder>>) -> Self {
        Self { builders }
    }

    /// A definition whose type no builder supports is a fatal
    /// configuration error.
    pub fn create_agent(&self, definition: &AgentDefinition) -> Result<Arc<dyn Agent>> {
        let builder = self
            .builders
            .iter()
            .find(|builder| builder.supports(&definition.agent_type))
            .ok_or_else(|| FlowCoreError::NoBuilderForType(definition.agent_type.clone()))?;
        builder.build(definition)
    }
}

/// Constructor functions receive the definition and its resolved enabled
/// extensions, so initialization happens at construction time.
pub type AgentConstructor =
    Arc<dyn Fn(&AgentDefinition, Vec<Arc<dyn AgentExtension>>) -> Result<Arc<dyn Agent>> + Send + Sync>;

/// Named agent constructors registered by the host process at startup.
/// This is the in-process half of `native` agent resolution; plugins are
/// the fallback half.
#[derive(Default)]
pub struct AgentConstructorRegistry {
    constructors: HashMap<String, AgentConstructor>,
}

impl AgentConstructorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Into<String>>(&mut self, entry: T, constructor: AgentConstructor) {
        self.constructors.insert(entry.into(), constructor);
    }

    pub fn get(&self, entry: &str) -> Option<&AgentConstructor> {
        self.constructors.get(entry)
    }

    pub fn has(&self, entry: &str) -> bool {
        self.constructors.contains_key(entry)
    }
}

/// Builds `llm`-typed agents around the configured LLM client.
pub struct LlmAgentBuilder {
    client: Arc<dyn LlmClient>,
    extensions: Arc<AgentExtensionRegistry>,
}

impl LlmAgentBuilder {
    pub fn new(client: Arc<dyn LlmClient>, extensions: Arc<AgentExtensionRegistry>) -> Self {
        Self { client, extensions }
    }
}

impl AgentBuilder for LlmAgentBuilder {
    fn supports(&self, agent_type: &str) -> bool {
        agent_type.eq_ignore_ascii_case("llm")
    }

    fn build(&self, definition: &AgentDefinition) -> Result<Arc<dyn Agent>> {
        let extensions = self.extensions.enabled(definition.enabled_extensions());
        Ok(Arc::new(ExtensibleLlmAgent::new(
            definition.clone(),
            extensions,
            Arc::clone(&self.client),
        )))
    }
}

/// Builds `native`-typed agents: the definition's `entry` config names a
/// constructor. The in-process constructor registry is consulted first,
/// then every plugin provider in turn; exhausting all providers without a
/// successful construction is fatal.
pub struct NativeAgentBuilder {
    constructors: Arc<AgentConstructorRegistry>,
    plugins: Arc<PluginRegistry>,
    extensions: Arc<AgentExtensionRegistry>,
}

impl NativeAgentBuilder {
    pub fn new(
        constructors: Arc<AgentConstructorRegistry>,
        plugins: Arc<PluginRegistry>,
        extensions: Arc<AgentExtensionRegistry>,
    ) -> Self {
        Self {
            constructors,
            plugins,
            extensions,
        }
    }
}

impl AgentBuilder for NativeAgentBuilder {
    fn supports(&self, agent_type: &str) -> bool {
        agent_type.eq_ignore_ascii_case("native")
    }

    fn build(&self, definition: &AgentDefinition) -> Result<Arc<dyn Agent>> {
        let entry = definition.config().get("entry").ok_or_else(|| {
            FlowCoreError::Loader(format!(
                "native agent `{}` has no `entry` in its config",
                definition.agent_id
            ))
        })?;
        let extensions = self.extensions.enabled(definition.enabled_extensions());

        if let Some(constructor) = self.constructors.get(entry) {
            return constructor(definition, extensions);
        }
        tracing::debug!(entry, "constructor not registered in-process, scanning plugins");

        for provider in self.plugins.providers() {
            match provider.construct(entry, definition, extensions.clone()) {
                Some(Ok(agent)) => {
                    tracing::info!(entry, plugin = provider.plugin_name(), "agent loaded from plugin");
                    return Ok(agent);
                }
                Some(Err(error)) => {
                    tracing::warn!(
                        entry,
                        plugin = provider.plugin_name(),
                        %error,
                        "plugin failed to construct agent"
                    );
                }
                None => {}
            }
        }

        Err(FlowCoreError::ConstructorNotFound(entry.clone()))
    }
}
