use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::AgentContext;
use crate::error::{FlowCoreError, Result};
use crate::executor::AgentExecutor;
use crate::expr::ConditionEvaluator;
use crate::loader::FlowLoader;
use crate::model::{Flow, Task};

pub mod conversational;
pub mod parallel;
pub mod sequential;
pub mod subflow;

pub use conversational::ConversationalFlowEngine;
pub use parallel::ParallelFlowEngine;
pub use sequential::SequentialFlowEngine;

/// Context key holding the current element during a `loop_over` fan-out.
pub const LOOP_ITEM_KEY: &str = "loop_item";

/// Interprets one flow's task list against a shared context. The engine
/// registry is threaded through explicitly so subflows can resolve their
/// own engine without any global state.
#[async_trait]
pub trait FlowEngine: Send + Sync {
    /// The flow `type` value this engine serves.
    fn flow_type(&self) -> &str;
    async fn execute(
        &self,
        flow: Arc<Flow>,
        context: AgentContext,
        engines: Arc<FlowEngineRegistry>,
    ) -> Result<()>;
}

#[derive(Default)]
pub struct FlowEngineRegistry {
    engines: HashMap<String, Arc<dyn FlowEngine>>,
}

impl FlowEngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, engine: Arc<dyn FlowEngine>) {
        self.engines.insert(engine.flow_type().to_string(), engine);
    }

    pub fn get(&self, flow_type: &str) -> Result<Arc<dyn FlowEngine>> {
        self.engines
            .get(flow_type)
            .cloned()
            .ok_or_else(|| FlowCoreError::EngineNotRegistered(flow_type.to_string()))
    }
}

/// Registry with the three stock engines wired to one task runner.
pub fn default_engine_registry(runner: Arc<TaskRunner>) -> FlowEngineRegistry {
    let mut registry = FlowEngineRegistry::new();
    registry.register(Arc::new(SequentialFlowEngine::new(Arc::clone(&runner))));
    registry.register(Arc::new(ParallelFlowEngine::new(Arc::clone(&runner))));
    registry.register(Arc::new(ConversationalFlowEngine::new(runner)));
    registry
}

/// The per-task logic every engine variant shares: globals merge,
/// skip-condition evaluation, loop resolution, dispatch to agent or
/// subflow, and optional-failure absorption.
pub struct TaskRunner {
    executor: Arc<AgentExecutor>,
    loader: Arc<dyn FlowLoader>,
}

impl TaskRunner {
    pub fn new(executor: Arc<AgentExecutor>, loader: Arc<dyn FlowLoader>) -> Self {
        Self { executor, loader }
    }

    /// Shared pre-step: flow globals land in the context before any task.
    pub fn merge_globals(&self, flow: &Flow, context: &AgentContext) {
        if !flow.globals.is_empty() {
            context.put_all(&flow.globals);
            tracing::debug!(flow_id = %flow.id, context = ?context, "globals merged into context");
        }
    }

    pub fn should_skip(&self, task: &Task, flow: &Flow, context: &AgentContext) -> bool {
        let Some(condition) = task.condition.as_deref() else {
            return false;
        };
        let condition = condition.trim();
        if condition.is_empty() {
            return false;
        }
        tracing::debug!(task_id = %task.id, condition, "evaluating condition");
        let holds = ConditionEvaluator::evaluate(condition, context, &flow.globals);
        if !holds {
            tracing::info!(task_id = %task.id, condition, "skipping task, condition not met");
        }
        !holds
    }

    /// `Some(items)` when the task fans out over a context list; `None`
    /// means execute exactly once (including the warned not-a-list case).
    pub fn loop_items(&self, task: &Task, context: &AgentContext) -> Option<Vec<Value>> {
        let loop_over = task.loop_over.as_deref()?.trim();
        if loop_over.is_empty() {
            return None;
        }
        match context.get(loop_over) {
            Some(Value::Array(items)) => Some(items),
            _ => {
                tracing::warn!(
                    task_id = %task.id,
                    loop_over,
                    "loop variable is absent or not a list, executing task once"
                );
                None
            }
        }
    }

    /// Dispatches to the subflow runner or the agent executor. Errors come
    /// back raw; `absorb` decides what they mean for the flow.
    pub async fn dispatch(
        &self,
        task: &Task,
        context: &AgentContext,
        engines: &Arc<FlowEngineRegistry>,
    ) -> Result<()> {
        if task.flow_ref.as_deref().is_some_and(|r| !r.is_empty()) {
            tracing::info!(task_id = %task.id, flow_ref = ?task.flow_ref, "executing subflow");
            subflow::execute_subflow(task, context, self.loader.as_ref(), engines).await
        } else {
            tracing::info!(task_id = %task.id, agent_id = %task.agent_id, "executing task");
            self.executor.execute(task, context).await
        }
    }

    /// The `optional` flag is a branch on the error path: an optional
    /// failure is logged and absorbed, a non-optional one is wrapped with
    /// the task id and aborts the flow.
    pub fn absorb(&self, task: &Task, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(error) if task.optional => {
                tracing::warn!(task_id = %task.id, %error, "optional task failed");
                Ok(())
            }
            // Subflow errors already carry the task id.
            Err(error @ FlowCoreError::SubflowFailed { .. }) => {
                tracing::error!(task_id = %task.id, %error, "task failed");
                Err(error)
            }
            Err(error) => {
                tracing::error!(task_id = %task.id, %error, "task failed");
                Err(FlowCoreError::for_task(&task.id, error))
            }
        }
    }

    pub async fn run_task(
        &self,
        task: &Task,
        context: &AgentContext,
        engines: &Arc<FlowEngineRegistry>,
    ) -> Result<()> {
        let result = self.dispatch(task, context, engines).await;
        self.absorb(task, result)
    }
}
