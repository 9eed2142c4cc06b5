use std::sync::Arc;

use super::FlowEngineRegistry;
use crate::context::AgentContext;
use crate::error::{FlowCoreError, Result};
use crate::loader::FlowLoader;
use crate::model::Task;

fn wrap(task_id: &str, source: FlowCoreError) -> FlowCoreError {
    FlowCoreError::SubflowFailed {
        task_id: task_id.to_string(),
        source: Box::new(source),
    }
}

/// Loads the flow named by `task.flow_ref` and runs it against the same
/// context, so subflow mutations are visible to the parent immediately.
/// When the parent task declares an output key, the value stored under the
/// subflow's last task's output key is copied across. Every failure is
/// wrapped with the originating task id.
pub async fn execute_subflow(
    task: &Task,
    context: &AgentContext,
    loader: &dyn FlowLoader,
    engines: &Arc<FlowEngineRegistry>,
) -> Result<()> {
    let flow_ref = task.flow_ref.as_deref().unwrap_or_default();
    let subflow = loader.load(flow_ref).map_err(|e| wrap(&task.id, e))?;
    let engine = engines
        .get(&subflow.flow_type)
        .map_err(|e| wrap(&task.id, e))?;

    let subflow = Arc::new(subflow);
    engine
        .execute(Arc::clone(&subflow), context.clone(), Arc::clone(engines))
        .await
        .map_err(|e| wrap(&task.id, e))?;

    if let Some(output_key) = task.output_key.as_deref() {
        if let Some(last_key) = subflow
            .tasks
            .last()
            .and_then(|last| last.output_key.as_deref())
        {
            if let Some(value) = context.get(last_key) {
                context.put(output_key, value);
            }
        }
    }
    Ok(())
}
