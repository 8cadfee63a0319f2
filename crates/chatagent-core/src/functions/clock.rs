//! `current_time`: a small built-in function that reports the current time.

use async_trait::async_trait;
use chrono::{Local, Utc};
use serde_json::{json, Map, Value};

use super::ChatFunction;

pub struct CurrentTimeFunction;

#[async_trait]
impl ChatFunction for CurrentTimeFunction {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Use this whenever the user asks about \
         today's date, the time, or anything relative to now."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "utc": {
                    "type": "boolean",
                    "description": "Return UTC instead of the server's local time."
                }
            }
        })
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let utc = args.get("utc").and_then(Value::as_bool).unwrap_or(false);
        let (now, timezone) = if utc {
            (Utc::now().to_rfc3339(), "UTC")
        } else {
            (Local::now().to_rfc3339(), "local")
        };
        Ok(json!({ "now": now, "timezone": timezone }))
    }
}
