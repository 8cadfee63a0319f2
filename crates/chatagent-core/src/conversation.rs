//! Conversation state: an append-only, ordered log of messages.
//!
//! A conversation belongs to one chat session. The engine appends the
//! assistant's replies and function results to it; everything else
//! (persistence, expiry) is up to the caller, which can round-trip the log
//! through [`Conversation::messages`] and [`Conversation::load_messages`].

use serde_json::{json, Value};

use crate::error::Result;
use crate::types::{Message, Role};

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole history, e.g. with one restored from a previous request.
    pub fn load_messages(&mut self, messages: Vec<Message>) -> &mut Self {
        self.messages = messages;
        self
    }

    pub fn append(&mut self, message: Message) -> &mut Self {
        self.messages.push(message);
        self
    }

    pub fn add_message(&mut self, content: &str, role: Role) -> &mut Self {
        self.append(Message::new(role, content))
    }

    /// Append with a role given as text, e.g. from a stored widget history.
    /// An empty role means `user`; an unknown one is rejected.
    pub fn add_message_with_role(&mut self, content: &str, role: &str) -> Result<&mut Self> {
        let role: Role = role.parse()?;
        Ok(self.add_message(content, role))
    }

    pub fn add_user_message(&mut self, content: &str) -> &mut Self {
        self.add_message(content, Role::User)
    }

    /// Most recently appended message, if any.
    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Build the outbound `messages` array.
    ///
    /// The system message goes first when non-empty. Function results carry
    /// `name`; pending function calls carry `function_call` with a null
    /// content; everything else is `{role, content}` with content defaulting
    /// to an empty string.
    pub fn serialize_for_request(&self, system_message: Option<&str>) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);

        if let Some(system) = system_message.filter(|s| !s.is_empty()) {
            out.push(json!({ "role": Role::System, "content": system }));
        }

        for message in &self.messages {
            let value = match &message.function_call {
                _ if message.role == Role::Function => json!({
                    "role": Role::Function,
                    "name": message.name.as_deref().unwrap_or(""),
                    "content": message.text(),
                }),
                Some(call) if message.is_function_call() => json!({
                    "role": Role::Assistant,
                    "function_call": call,
                    "content": message.content,
                }),
                _ => json!({
                    "role": message.role,
                    "content": message.text(),
                }),
            };
            out.push(value);
        }

        out
    }
}
