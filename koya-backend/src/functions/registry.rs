use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{FunctionContext, FunctionDefinition, FunctionResult};
use crate::personality::Phrase;

/// A function the voice agent can invoke mid-call
#[async_trait]
pub trait CallFunction: Send + Sync {
    fn definition(&self) -> FunctionDefinition;

    /// Run the function. Failures come back as spoken sentences, never as errors.
    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult;

    fn name(&self) -> String {
        self.definition().name
    }
}

pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn CallFunction>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry {
            functions: HashMap::new(),
        }
    }

    pub fn register(&mut self, function: Arc<dyn CallFunction>) {
        let name = function.name();
        self.functions.insert(name, function);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CallFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// All definitions, sorted by name
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        let mut defs: Vec<FunctionDefinition> = self.functions.values().map(|f| f.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Validate arguments against the function's schema and run it
    pub async fn dispatch(&self, name: &str, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let Some(function) = self.get(name) else {
            log::warn!("[functions] Unknown function '{}' for business {}", name, ctx.business.id);
            return FunctionResult::failure(format!(
                "I'm not able to help with that one over the phone. {}",
                ctx.say(Phrase::MessageFallback)
            ));
        };

        let args = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                log::warn!("[functions] {} called with non-object args: {}", name, other);
                return ctx.fail(Phrase::GenericError);
            }
        };

        let definition = function.definition();
        if let Some(missing) = missing_required(&definition, &args) {
            log::info!("[functions] {} missing required argument '{}'", name, missing);
            return FunctionResult::failure(format!(
                "I just need one more detail first. Could you tell me the {}?",
                missing.replace('_', " ")
            ))
            .with_data(serde_json::json!({ "missing_argument": missing }));
        }

        log::info!("[functions] {} for business {}", name, ctx.business.id);
        function.execute(Value::Object(args), ctx).await
    }
}

/// First required property that is absent, null or blank
fn missing_required<'a>(definition: &'a FunctionDefinition, args: &Map<String, Value>) -> Option<&'a str> {
    definition
        .input_schema
        .required
        .iter()
        .find(|field| match args.get(field.as_str()) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::test_context;
    use crate::functions::types::PropertySchema;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct EchoFunction;

    #[async_trait]
    impl CallFunction for EchoFunction {
        fn definition(&self) -> FunctionDefinition {
            FunctionDefinition::new("echo", "Repeat what was said")
                .required_property("text", PropertySchema::string("Text to repeat"))
        }

        async fn execute(&self, args: Value, _ctx: &FunctionContext) -> FunctionResult {
            FunctionResult::success(args["text"].as_str().unwrap_or_default())
        }
    }

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        registry.register(Arc::new(EchoFunction));
        registry
    }

    #[tokio::test]
    async fn test_dispatches_known_function() {
        let ctx = test_context(Utc.with_ymd_and_hms(2030, 3, 5, 14, 0, 0).unwrap());
        let result = registry().dispatch("echo", json!({"text": "hello"}), &ctx).await;
        assert!(result.success);
        assert_eq!(result.result, "hello");
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let ctx = test_context(Utc.with_ymd_and_hms(2030, 3, 5, 14, 0, 0).unwrap());
        for args in [json!({}), json!({"text": null}), json!({"text": "  "}), Value::Null] {
            let result = registry().dispatch("echo", args, &ctx).await;
            assert!(!result.success);
            assert!(result.result.contains("text"));
        }
    }

    #[tokio::test]
    async fn test_unknown_function_gets_spoken_fallback() {
        let ctx = test_context(Utc.with_ymd_and_hms(2030, 3, 5, 14, 0, 0).unwrap());
        let result = registry().dispatch("order_pizza", json!({}), &ctx).await;
        assert!(!result.success);
        assert!(result.result.ends_with(ctx.say(Phrase::MessageFallback)));
    }

    #[test]
    fn test_definitions_sorted() {
        let registry = super::super::create_default_registry();
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(registry.len(), 14);
    }
}
