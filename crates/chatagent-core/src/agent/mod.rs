//! Agent loop: the conversation engine.
//!
//! The loop:
//! 1. Builds the payload (system message + history + function schemas)
//! 2. Sends it through the configured provider
//! 3. If the model asks for a function → runs it → appends the call and its
//!    result to the conversation → repeats
//! 4. When the model answers with text → appends it and returns
//!
//! Only one request is in flight per conversation; function execution happens
//! between requests. The number of requests per [`ChatAgent::send`] is capped
//! by [`OrchestrationConfig::max_iterations`].

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_MAX_FUNCTION_ITERATIONS, DEFAULT_MODEL};
use crate::conversation::Conversation;
use crate::error::{ChatError, Result};
use crate::functions::{resolve_function_call_directive, FunctionCallSetting, FunctionRegistry};
use crate::provider::AiProvider;
use crate::types::{CompletionResponse, Message, ResponseMessage};

/// Settings for the agent loop, resolved once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationConfig {
    pub model: String,
    /// Omitted from the request when unset or zero.
    pub temperature: Option<f64>,
    /// Omitted from the request when unset or zero.
    pub max_tokens: Option<u32>,
    pub system_message: Option<String>,
    pub function_call: Option<FunctionCallSetting>,
    /// Maximum provider requests per `send`.
    pub max_iterations: u32,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            temperature: None,
            max_tokens: None,
            system_message: None,
            function_call: None,
            max_iterations: DEFAULT_MAX_FUNCTION_ITERATIONS,
        }
    }
}

/// The conversation engine.
pub struct ChatAgent {
    provider: Box<dyn AiProvider>,
    functions: FunctionRegistry,
    config: OrchestrationConfig,
}

impl ChatAgent {
    pub fn new(
        provider: Box<dyn AiProvider>,
        functions: FunctionRegistry,
        config: OrchestrationConfig,
    ) -> Self {
        Self {
            provider,
            functions,
            config,
        }
    }

    pub fn provider(&self) -> &dyn AiProvider {
        self.provider.as_ref()
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    /// Provider-agnostic request body for the current state of `conversation`.
    pub fn build_payload(&self, conversation: &Conversation) -> Value {
        let messages = conversation.serialize_for_request(self.config.system_message.as_deref());

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
        });

        if let Some(temperature) = self.config.temperature.filter(|t| *t != 0.0) {
            payload["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens.filter(|n| *n != 0) {
            payload["max_tokens"] = json!(max_tokens);
        }
        if !self.functions.is_empty() {
            payload["functions"] = json!(self.functions.format_for_request());
            payload["function_call"] =
                resolve_function_call_directive(self.config.function_call.as_ref());
        }

        payload
    }

    /// Run the loop until the model produces a text answer.
    ///
    /// On return the answer is `conversation.latest()`. Provider and
    /// configuration errors are logged and returned unchanged; nothing is
    /// retried.
    pub async fn send(&self, conversation: &mut Conversation) -> Result<()> {
        let max_iterations = self.config.max_iterations;
        let mut iterations = 0;

        loop {
            iterations += 1;
            if iterations > max_iterations {
                warn!(iterations = max_iterations, "Hit max function iterations, giving up");
                return Err(ChatError::MaxIterationsExceeded(max_iterations));
            }

            let payload = self.build_payload(conversation);
            debug!(
                iteration = iterations,
                msg_count = conversation.len(),
                "Calling provider"
            );

            let response = match self.provider.make_request(payload).await {
                Ok(response) => response,
                Err(e) => {
                    error!(provider = self.provider.name(), error = %e, "AI provider error");
                    return Err(e);
                }
            };

            let message = self.first_message(response)?;

            match message.function_call {
                Some(call) => {
                    debug!(function = %call.name, "Model requested a function call");
                    let result = self.functions.dispatch(&call).await;
                    let name = call.name.clone();
                    conversation.append(Message::assistant_function_call(call));
                    conversation.append(Message::function_result(&name, &result));
                }
                None => {
                    let content = message.content.unwrap_or_default();
                    conversation.append(Message::assistant(&content));
                    info!(iterations, "Response complete");
                    return Ok(());
                }
            }
        }
    }

    /// Append a user message, run the loop, and return the answer text.
    pub async fn ask(&self, conversation: &mut Conversation, content: &str) -> Result<String> {
        conversation.add_user_message(content);
        self.send(conversation).await?;
        Ok(conversation
            .latest()
            .map(|m| m.text().to_string())
            .unwrap_or_default())
    }

    fn first_message(&self, response: Value) -> Result<ResponseMessage> {
        let provider = self.provider.name();
        let malformed = |detail: String| {
            error!(provider, error = %detail, "AI provider error");
            ChatError::provider(provider, None, format!("Malformed provider response: {detail}"))
        };

        let completion: CompletionResponse =
            serde_json::from_value(response).map_err(|e| malformed(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .ok_or_else(|| malformed("no choices[0].message".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::ChatFunction;
    use crate::types::{FunctionCall, Role};
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use serde_json::Map;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays canned responses and records every payload it receives.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<Value>>>,
        sent: Arc<Mutex<Vec<Value>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<Value>>) -> (Self, Arc<Mutex<Vec<Value>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let provider = Self {
                responses: Mutex::new(responses.into()),
                sent: Arc::clone(&sent),
            };
            (provider, sent)
        }
    }

    #[async_trait]
    impl AiProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn endpoint(&self) -> String {
            "memory://scripted".into()
        }
        fn headers(&self) -> Result<HeaderMap> {
            Ok(HeaderMap::new())
        }
        fn validate_config(&self) -> Result<()> {
            Ok(())
        }
        async fn make_request(&self, payload: Value) -> Result<Value> {
            self.sent.lock().unwrap().push(payload);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(text_response("out of script")))
        }
    }

    struct LookupFunction;

    #[async_trait]
    impl ChatFunction for LookupFunction {
        fn name(&self) -> &str {
            "lookup"
        }
        fn description(&self) -> &str {
            "Look something up"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"q": {"type": "string"}}, "required": ["q"]})
        }
        async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
            match args.get("q").and_then(Value::as_str) {
                Some("x") => Ok(json!({"result": "y"})),
                _ => anyhow::bail!("unknown query"),
            }
        }
    }

    fn text_response(content: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    fn call_response(name: &str, arguments: &str) -> Value {
        json!({"choices": [{"message": {
            "role": "assistant",
            "content": null,
            "function_call": {"name": name, "arguments": arguments}
        }}]})
    }

    fn lookup_registry() -> FunctionRegistry {
        let mut functions = FunctionRegistry::new();
        functions.register(Box::new(LookupFunction));
        functions
    }

    #[test]
    fn test_payload_without_optional_fields() {
        let (provider, _) = ScriptedProvider::new(vec![]);
        let agent = ChatAgent::new(Box::new(provider), FunctionRegistry::new(), OrchestrationConfig::default());

        let mut conv = Conversation::new();
        conv.add_user_message("Hello");
        assert_eq!(
            agent.build_payload(&conv),
            json!({"model": "gpt-4o-mini", "messages": [{"role": "user", "content": "Hello"}]})
        );
    }

    #[test]
    fn test_payload_with_all_fields() {
        let (provider, _) = ScriptedProvider::new(vec![]);
        let config = OrchestrationConfig {
            temperature: Some(0.5),
            max_tokens: Some(128),
            system_message: Some("Be brief.".into()),
            function_call: Some(FunctionCallSetting::Flag(false)),
            ..OrchestrationConfig::default()
        };
        let agent = ChatAgent::new(Box::new(provider), lookup_registry(), config);

        let mut conv = Conversation::new();
        conv.add_user_message("Hello");
        let payload = agent.build_payload(&conv);

        assert_eq!(payload["temperature"], json!(0.5));
        assert_eq!(payload["max_tokens"], json!(128));
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["functions"][0]["name"], "lookup");
        assert_eq!(payload["function_call"], "none");
    }

    #[test]
    fn test_default_temperature_is_sent_exactly() {
        let (provider, _) = ScriptedProvider::new(vec![]);
        let orchestration = crate::config::Config::default().orchestration();
        let agent = ChatAgent::new(Box::new(provider), FunctionRegistry::new(), orchestration);

        let payload = agent.build_payload(&Conversation::new());
        assert_eq!(payload["temperature"], json!(0.7));
        assert_eq!(serde_json::to_string(&payload["temperature"]).unwrap(), "0.7");
    }

    #[test]
    fn test_zero_temperature_and_tokens_are_omitted() {
        let (provider, _) = ScriptedProvider::new(vec![]);
        let config = OrchestrationConfig {
            temperature: Some(0.0),
            max_tokens: Some(0),
            ..OrchestrationConfig::default()
        };
        let agent = ChatAgent::new(Box::new(provider), FunctionRegistry::new(), config);
        let payload = agent.build_payload(&Conversation::new());
        assert!(payload.get("temperature").is_none());
        assert!(payload.get("max_tokens").is_none());
        assert!(payload.get("functions").is_none());
        assert!(payload.get("function_call").is_none());
    }

    #[tokio::test]
    async fn test_text_reply_terminates_after_one_request() {
        let (provider, sent) = ScriptedProvider::new(vec![Ok(text_response("Hi there"))]);
        let agent = ChatAgent::new(Box::new(provider), FunctionRegistry::new(), OrchestrationConfig::default());

        let mut conv = Conversation::new();
        let answer = agent.ask(&mut conv, "Hello").await.unwrap();

        assert_eq!(answer, "Hi there");
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(conv.latest().unwrap(), &Message::assistant("Hi there"));
    }

    #[tokio::test]
    async fn test_missing_content_becomes_empty_reply() {
        let response = json!({"choices": [{"message": {"role": "assistant"}}]});
        let (provider, _) = ScriptedProvider::new(vec![Ok(response)]);
        let agent = ChatAgent::new(Box::new(provider), FunctionRegistry::new(), OrchestrationConfig::default());

        let mut conv = Conversation::new();
        conv.add_user_message("Hello");
        agent.send(&mut conv).await.unwrap();
        assert_eq!(conv.latest().unwrap().content.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_function_call_feeds_result_back() {
        let (provider, sent) = ScriptedProvider::new(vec![
            Ok(call_response("lookup", r#"{"q":"x"}"#)),
            Ok(text_response("It is y.")),
        ]);
        let agent = ChatAgent::new(Box::new(provider), lookup_registry(), OrchestrationConfig::default());

        let mut conv = Conversation::new();
        let answer = agent.ask(&mut conv, "What is x?").await.unwrap();
        assert_eq!(answer, "It is y.");

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let messages = sent[1]["messages"].as_array().unwrap();
        let tail = &messages[messages.len() - 2..];
        assert_eq!(
            tail[0],
            json!({"role": "assistant", "content": null, "function_call": {"name": "lookup", "arguments": "{\"q\":\"x\"}"}})
        );
        assert_eq!(
            tail[1],
            json!({"role": "function", "name": "lookup", "content": "{\"result\":\"y\"}"})
        );

        let roles: Vec<Role> = conv.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::Function, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_function_error_is_fed_back_not_raised() {
        let (provider, sent) = ScriptedProvider::new(vec![
            Ok(call_response("lookup", r#"{"q":"nope"}"#)),
            Ok(text_response("Sorry, I couldn't find that.")),
        ]);
        let agent = ChatAgent::new(Box::new(provider), lookup_registry(), OrchestrationConfig::default());

        let mut conv = Conversation::new();
        agent.ask(&mut conv, "What is nope?").await.unwrap();

        let function_msg = &conv.messages()[2];
        assert_eq!(function_msg.role, Role::Function);
        assert_eq!(function_msg.text(), r#"{"error":"unknown query"}"#);
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_function_call_without_registry() {
        let (provider, _) = ScriptedProvider::new(vec![
            Ok(call_response("lookup", "{}")),
            Ok(text_response("done")),
        ]);
        let agent = ChatAgent::new(Box::new(provider), FunctionRegistry::new(), OrchestrationConfig::default());

        let mut conv = Conversation::new();
        agent.ask(&mut conv, "hi").await.unwrap();
        assert_eq!(conv.messages()[2].text(), r#"{"error":"Function not available"}"#);
    }

    #[tokio::test]
    async fn test_runaway_function_calls_hit_iteration_cap() {
        let responses = (0..5).map(|_| Ok(call_response("lookup", r#"{"q":"x"}"#))).collect();
        let (provider, sent) = ScriptedProvider::new(responses);
        let config = OrchestrationConfig {
            max_iterations: 3,
            ..OrchestrationConfig::default()
        };
        let agent = ChatAgent::new(Box::new(provider), lookup_registry(), config);

        let mut conv = Conversation::new();
        let err = agent.ask(&mut conv, "loop forever").await.unwrap_err();
        assert!(matches!(err, ChatError::MaxIterationsExceeded(3)));
        assert_eq!(sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_provider_error_is_returned_unchanged() {
        let (provider, _) = ScriptedProvider::new(vec![Err(ChatError::provider(
            "scripted",
            Some(500),
            "OpenAI API Error: boom",
        ))]);
        let agent = ChatAgent::new(Box::new(provider), FunctionRegistry::new(), OrchestrationConfig::default());

        let mut conv = Conversation::new();
        let err = agent.ask(&mut conv, "Hello").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(conv.len(), 1);
    }

    #[tokio::test]
    async fn test_response_without_choices_is_provider_error() {
        let (provider, _) = ScriptedProvider::new(vec![Ok(json!({"choices": []}))]);
        let agent = ChatAgent::new(Box::new(provider), FunctionRegistry::new(), OrchestrationConfig::default());

        let mut conv = Conversation::new();
        let err = agent.ask(&mut conv, "Hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Provider { provider: "scripted", .. }));
        assert_eq!(conv.len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_resent_on_every_request() {
        let (provider, sent) = ScriptedProvider::new(vec![Ok(text_response("first")), Ok(text_response("second"))]);
        let agent = ChatAgent::new(Box::new(provider), FunctionRegistry::new(), OrchestrationConfig::default());

        let mut conv = Conversation::new();
        agent.ask(&mut conv, "one").await.unwrap();
        agent.ask(&mut conv, "two").await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[1]["messages"].as_array().unwrap().len(), 3);
        assert_eq!(conv.latest().unwrap().text(), "second");
    }

    #[test]
    fn test_function_call_message_round_trip() {
        let call = FunctionCall::new("lookup", "{}");
        let msg = Message::assistant_function_call(call.clone());
        assert_eq!(msg.function_call, Some(call));
    }
}
