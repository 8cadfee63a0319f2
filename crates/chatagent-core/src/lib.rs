//! chatagent-core: conversation and function-calling engine for OpenAI and
//! Azure OpenAI.
//!
//! - [`config`] — Typed configuration loading from JSON, with env fallbacks
//! - [`provider`] — `AiProvider` trait, OpenAI and Azure OpenAI adapters
//! - [`conversation`] — Ordered message log and request serialization
//! - [`functions`] — `ChatFunction` trait, registry, and dispatch
//! - [`agent`] — The request → function call → request loop
//!
//! # Quick Start
//!
//! ```no_run
//! use chatagent_core::agent::ChatAgent;
//! use chatagent_core::config::Config;
//! use chatagent_core::conversation::Conversation;
//! use chatagent_core::functions::{clock::CurrentTimeFunction, FunctionRegistry};
//! use chatagent_core::provider;
//!
//! # async fn run() -> chatagent_core::error::Result<()> {
//! let config = Config::load()?;
//! let provider = provider::from_config(&config, reqwest::Client::new())?;
//!
//! let mut functions = FunctionRegistry::new();
//! functions.register(Box::new(CurrentTimeFunction));
//!
//! let agent = ChatAgent::new(provider, functions, config.orchestration());
//! let mut conversation = Conversation::new();
//! let answer = agent.ask(&mut conversation, "What time is it?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod functions;
pub mod provider;
pub mod types;
