//! Function calling: trait, registry, and dispatch.
//!
//! Every function the model may call implements [`ChatFunction`] and is
//! registered, in order, in a [`FunctionRegistry`]. The agent loop sends the
//! registry's schemas with each request and hands any function call the model
//! makes back to [`FunctionRegistry::dispatch`].
//!
//! Dispatch never fails. A missing registry, an unknown name, or an executor
//! error all become an `{"error": ...}` string that is fed back to the model.

pub mod clock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};

use crate::types::FunctionCall;

/// Trait that all callable functions must implement.
#[async_trait]
pub trait ChatFunction: Send + Sync {
    /// Name the model uses to call this function (e.g., "current_time").
    fn name(&self) -> &str;

    /// Human-readable description sent to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the function's parameters.
    fn parameters(&self) -> Value;

    /// Schema sent to the provider. `None` (or anything without a string
    /// `name`) leaves the function out of the request.
    fn schema(&self) -> Option<Value> {
        Some(json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": self.parameters(),
        }))
    }

    /// Run the function. A string result is passed to the model verbatim,
    /// any other value is JSON-encoded first.
    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value>;
}

/// Whether, and which, function the model should call.
///
/// Deserializes from `true`, `false`, or a function name; an absent value
/// means "let the model decide".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionCallSetting {
    Flag(bool),
    Name(String),
}

/// Map the configured setting to the provider's `function_call` value.
pub fn resolve_function_call_directive(setting: Option<&FunctionCallSetting>) -> Value {
    match setting {
        Some(FunctionCallSetting::Flag(false)) => json!("none"),
        Some(FunctionCallSetting::Name(name)) if !name.is_empty() => json!({ "name": name }),
        _ => json!("auto"),
    }
}

/// Ordered set of functions available to the model.
///
/// Names should be unique; when they aren't, the first registration wins.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: Vec<Box<dyn ChatFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: Box<dyn ChatFunction>) {
        debug!(function = function.name(), "Registered function");
        self.functions.push(function);
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions.iter().map(|f| f.name()).collect()
    }

    /// Schemas for the request's `functions` array. Functions without a
    /// usable schema are skipped.
    pub fn format_for_request(&self) -> Vec<Value> {
        self.functions
            .iter()
            .filter_map(|function| {
                let schema = function.schema();
                if schema.as_ref().and_then(schema_name).is_none() {
                    debug!(function = function.name(), "Skipping function without a usable schema");
                    return None;
                }
                schema
            })
            .collect()
    }

    /// Run the function the model asked for and return its result as text.
    pub async fn dispatch(&self, call: &FunctionCall) -> String {
        if self.functions.is_empty() {
            return error_result("Function not available");
        }

        let args = parse_arguments(call);

        for function in &self.functions {
            let matches = function
                .schema()
                .as_ref()
                .and_then(schema_name)
                .is_some_and(|name| name == call.name);
            if !matches {
                continue;
            }

            debug!(function = %call.name, "Executing function");
            return match function.execute(args).await {
                Ok(Value::String(text)) => text,
                Ok(value) => value.to_string(),
                Err(e) => {
                    error!(function = %call.name, error = %e, "Function execution error");
                    error_result(&e.to_string())
                }
            };
        }

        warn!(function = %call.name, "Model requested an unknown function");
        error_result("Function not found")
    }
}

fn schema_name(schema: &Value) -> Option<&str> {
    schema.get("name").and_then(Value::as_str)
}

fn parse_arguments(call: &FunctionCall) -> Map<String, Value> {
    let raw = match call.arguments.as_deref() {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Map::new(),
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!(function = %call.name, raw, "Function arguments are not a JSON object, using none");
            Map::new()
        }
    }
}

fn error_result(message: &str) -> String {
    json!({ "error": message }).to_string()
}
