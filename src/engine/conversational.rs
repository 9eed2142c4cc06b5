use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{FlowEngine, FlowEngineRegistry, TaskRunner, LOOP_ITEM_KEY};
use crate::context::AgentContext;
use crate::error::Result;
use crate::model::{Flow, Task};

/// Sequential execution that additionally maintains the conversation log:
/// a `User: ...` entry when the task's raw `user_input` differs from the
/// previous one, and an `Agent: ...` entry when the task's output differs
/// from the previous response. Comparison is trim + lowercase, so
/// re-invoking a task with unchanged input/output (e.g. in a loop) does
/// not duplicate log entries.
pub struct ConversationalFlowEngine {
    runner: Arc<TaskRunner>,
    last_user_message: Mutex<Option<String>>,
    last_agent_response: Mutex<Option<String>>,
}

impl ConversationalFlowEngine {
    pub fn new(runner: Arc<TaskRunner>) -> Self {
        Self {
            runner,
            last_user_message: Mutex::new(None),
            last_agent_response: Mutex::new(None),
        }
    }

    fn record_user_input(&self, task: &Task, context: &AgentContext) {
        let Some(Value::String(input)) = task.input.get("user_input") else {
            return;
        };
        // Raw reference strings are not user turns.
        if input.trim().starts_with("${") {
            return;
        }
        let normalized = input.trim().to_lowercase();
        let mut last = self.last_user_message.lock();
        if last.as_deref() != Some(normalized.as_str()) {
            context.add_message(format!("User: {input}"));
            *last = Some(normalized);
            tracing::debug!(task_id = %task.id, "user message added to context");
        }
    }

    fn record_agent_response(&self, task: &Task, context: &AgentContext) {
        let Some(output_key) = task.output_key.as_deref() else {
            return;
        };
        let Some(result) = context.get(output_key) else {
            return;
        };
        let text = match &result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let normalized = text.trim().to_lowercase();
        let mut last = self.last_agent_response.lock();
        if last.as_deref() != Some(normalized.as_str()) {
            context.add_message(format!("Agent: {text}"));
            *last = Some(normalized);
            tracing::debug!(task_id = %task.id, "agent response added to context");
        }
    }

    async fn run_step(
        &self,
        task: &Task,
        context: &AgentContext,
        engines: &Arc<FlowEngineRegistry>,
    ) -> Result<()> {
        self.record_user_input(task, context);
        self.runner.run_task(task, context, engines).await?;
        self.record_agent_response(task, context);
        Ok(())
    }
}

#[async_trait]
impl FlowEngine for ConversationalFlowEngine {
    fn flow_type(&self) -> &str {
        "conversational"
    }

    async fn execute(
        &self,
        flow: Arc<Flow>,
        context: AgentContext,
        engines: Arc<FlowEngineRegistry>,
    ) -> Result<()> {
        self.runner.merge_globals(&flow, &context);
        for task in &flow.tasks {
            if self.runner.should_skip(task, &flow, &context) {
                continue;
            }
            match self.runner.loop_items(task, &context) {
                Some(items) => {
                    for item in items {
                        context.put(LOOP_ITEM_KEY, item);
                        self.run_step(task, &context, &engines).await?;
                    }
                }
                None => self.run_step(task, &context, &engines).await?,
            }
        }
        Ok(())
    }
}
