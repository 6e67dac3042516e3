// nodes/route.rs — Generic truthiness router for custom graphs.
//
// Sends its input down "true" or "false" based on a value (optionally a
// named field of an object input). Null, false, 0, "" and empty arrays
// count as false, mirroring the usual JSON truthiness rules.

use async_trait::async_trait;

use vol_graph::{
    outputs, ExecutionContext, HandlerError, NodeDefinition, NodeHandler, NodeKind, NodeOutputs,
    PropertySpec, SlotSpec,
};

pub struct RouterHandler {
    definition: NodeDefinition,
}

impl RouterHandler {
    pub fn new() -> Self {
        Self {
            definition: NodeDefinition {
                kind: NodeKind::Router,
                category: "flow".to_string(),
                description: "Routes a value to the true or false branch".to_string(),
                inputs: vec![SlotSpec::required("value", "the value to test")],
                outputs: vec![
                    SlotSpec::optional("true", "the value, when truthy"),
                    SlotSpec::optional("false", "the value, when falsy"),
                ],
                properties: vec![PropertySpec {
                    name: "field".to_string(),
                    description: "object field to test instead of the value itself".to_string(),
                    default: None,
                }],
                routing: true,
            },
        }
    }
}

impl Default for RouterHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(_) => true,
    }
}

#[async_trait]
impl NodeHandler for RouterHandler {
    fn definition(&self) -> &NodeDefinition {
        &self.definition
    }

    async fn run(
        &self,
        inputs: &[serde_json::Value],
        _ctx: &ExecutionContext,
        properties: &serde_json::Value,
    ) -> Result<NodeOutputs, HandlerError> {
        let value = inputs[0].clone();
        let tested = match properties.get("field").and_then(|f| f.as_str()) {
            Some(field) => value.get(field).cloned().unwrap_or(serde_json::Value::Null),
            None => value.clone(),
        };

        let slot = if truthy(&tested) { "true" } else { "false" };
        Ok(outputs(&[(slot, value)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_rules() {
        assert!(!truthy(&serde_json::json!(null)));
        assert!(!truthy(&serde_json::json!(false)));
        assert!(!truthy(&serde_json::json!(0)));
        assert!(!truthy(&serde_json::json!("")));
        assert!(!truthy(&serde_json::json!([])));
        assert!(truthy(&serde_json::json!(true)));
        assert!(truthy(&serde_json::json!(3)));
        assert!(truthy(&serde_json::json!("x")));
        assert!(truthy(&serde_json::json!({"any": 1})));
    }
}
