pub mod agent;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod expr;
pub mod llm;
pub mod loader;
pub mod model;
pub mod plugin;
pub mod resolver;
pub mod runtime;
pub mod utils;

pub use agent::{
    builtin::{register_builtin_agents, EchoAgent, ExtensibleLlmAgent},
    factory::{
        AgentBuilder, AgentConstructor, AgentConstructorRegistry, AgentFactory, LlmAgentBuilder,
        NativeAgentBuilder,
    },
    registry::{AgentDefinitionRegistry, AgentExtensionRegistry},
    Agent, AgentExtension, AgentInvocation,
};
pub use context::{
    store::{ContextStore, InMemoryContextStore},
    AgentContext, ContextSnapshot,
};
pub use engine::{
    default_engine_registry, ConversationalFlowEngine, FlowEngine, FlowEngineRegistry,
    ParallelFlowEngine, SequentialFlowEngine, TaskRunner, LOOP_ITEM_KEY,
};
pub use error::{FlowCoreError, Result};
pub use executor::{AgentExecutor, FlowExecutor};
pub use expr::ConditionEvaluator;
pub use llm::{DynLlmClient, LlmClient, LlmRequest, LlmResponse, LocalEchoClient};
pub use loader::{validate_flow, AgentDefinitionLoader, FlowLoader, YamlFlowLoader};
pub use model::{AgentDefinition, Flow, Task};
pub use plugin::{AgentProvider, PluginError, PluginKind, PluginManifest, PluginRegistry};
pub use resolver::InputResolver;
pub use runtime::FlowRuntime;

#[cfg(feature = "redis-store")]
pub use context::store::redis::RedisContextStore;
