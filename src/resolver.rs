use std::collections::HashMap;

use serde_json::Value;

use crate::context::AgentContext;

/// Rewrites a task's declared input map, substituting `${name}` references
/// with the context's current value for `name`.
///
/// An unmatched reference deliberately passes through as the literal string
/// instead of failing; lists and maps are resolved element-wise. Dotted
/// paths are not supported here, the reference names one context key.
pub struct InputResolver;

impl InputResolver {
    pub fn resolve(
        inputs: &HashMap<String, Value>,
        context: &AgentContext,
    ) -> HashMap<String, Value> {
        inputs
            .iter()
            .map(|(key, value)| (key.clone(), Self::resolve_value(value, context)))
            .collect()
    }

    fn resolve_value(value: &Value, context: &AgentContext) -> Value {
        match value {
            Value::String(s) => match reference_name(s) {
                Some(name) => match context.get(name) {
                    Some(resolved) => resolved,
                    None => {
                        tracing::warn!(reference = %s, "unresolved input reference, passing through");
                        value.clone()
                    }
                },
                None => value.clone(),
            },
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| Self::resolve_value(item, context))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Self::resolve_value(value, context)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }
}

/// `${name}` when the whole string is a reference, else `None`.
fn reference_name(s: &str) -> Option<&str> {
    s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}'))
}
