use std::sync::Arc;

use crate::agent::factory::AgentFactory;
use crate::agent::registry::AgentDefinitionRegistry;
use crate::agent::AgentInvocation;
use crate::context::AgentContext;
use crate::engine::FlowEngineRegistry;
use crate::error::{FlowCoreError, Result};
use crate::model::{Flow, Task};
use crate::resolver::InputResolver;

/// Executes one agent task: definition lookup, agent construction, input
/// resolution, invocation, and output storage.
pub struct AgentExecutor {
    factory: Arc<AgentFactory>,
    definitions: Arc<AgentDefinitionRegistry>,
}

impl AgentExecutor {
    pub fn new(factory: Arc<AgentFactory>, definitions: Arc<AgentDefinitionRegistry>) -> Self {
        Self {
            factory,
            definitions,
        }
    }

    pub async fn execute(&self, task: &Task, context: &AgentContext) -> Result<()> {
        let definition = self
            .definitions
            .get(&task.agent_id)
            .ok_or_else(|| FlowCoreError::AgentNotDefined(task.agent_id.clone()))?;
        let agent = self.factory.create_agent(&definition)?;

        let inputs = InputResolver::resolve(&task.input, context);
        let mut invocation = AgentInvocation::new(inputs);
        agent
            .handle(&mut invocation, context)
            .await
            .map_err(|source| FlowCoreError::AgentFailed {
                agent_id: task.agent_id.clone(),
                source: Box::new(source),
            })?;

        match (invocation.take_result(), task.output_key.as_deref()) {
            (Some(result), Some(output_key)) => {
                tracing::info!(
                    agent_id = %task.agent_id,
                    output_key,
                    "agent executed, output stored"
                );
                context.put(output_key, result);
            }
            (None, Some(output_key)) => {
                tracing::info!(
                    agent_id = %task.agent_id,
                    output_key,
                    "agent executed, output key defined but result was empty (may be intentional)"
                );
            }
            (_, None) => {
                tracing::debug!(task_id = %task.id, "no output key, result discarded");
            }
        }
        Ok(())
    }
}

/// Top-level entry point: resolves the engine by the flow's declared type
/// and hands over execution.
pub struct FlowExecutor {
    engines: Arc<FlowEngineRegistry>,
}

impl FlowExecutor {
    pub fn new(engines: Arc<FlowEngineRegistry>) -> Self {
        Self { engines }
    }

    pub fn engines(&self) -> Arc<FlowEngineRegistry> {
        Arc::clone(&self.engines)
    }

    pub async fn run(&self, flow: Arc<Flow>, context: &AgentContext) -> Result<()> {
        let engine = self.engines.get(&flow.flow_type)?;
        tracing::info!(flow_id = %flow.id, flow_type = %flow.flow_type, "executing flow");
        engine
            .execute(flow, context.clone(), Arc::clone(&self.engines))
            .await
    }
}
