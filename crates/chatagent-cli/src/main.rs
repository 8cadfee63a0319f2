//! chatagent CLI — interactive chat, one-shot questions, onboarding, and status.
//!
//! Usage:
//!   chatagent chat            — Start an interactive chat session
//!   chatagent ask "question"  — Send one message and print the answer
//!   chatagent onboard         — Create a default configuration
//!   chatagent status          — Show the resolved provider and model

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};

use chatagent_core::agent::ChatAgent;
use chatagent_core::config::{Config, ProviderConfig};
use chatagent_core::conversation::Conversation;
use chatagent_core::functions::clock::CurrentTimeFunction;
use chatagent_core::functions::FunctionRegistry;
use chatagent_core::provider;

#[derive(Parser)]
#[command(
    name = "chatagent",
    version,
    about = "Chat with OpenAI or Azure OpenAI, with function calling"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Send a single message and print the reply
    Ask {
        /// The message to send
        message: String,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Create or reset the default configuration
    Onboard,

    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Chat { model }) => cmd_chat(model.as_deref()).await?,
        Some(Commands::Ask { message, model }) => cmd_ask(&message, model.as_deref()).await?,
        Some(Commands::Onboard) => cmd_onboard()?,
        Some(Commands::Status) => cmd_status()?,
        None => cmd_chat(None).await?,
    }

    Ok(())
}

// ── Shared Setup ────────────────────────────────────────────────────

fn load_config() -> Result<Config> {
    let config = Config::load()?;

    if !config.enabled {
        anyhow::bail!("chatagent is disabled (set \"enabled\": true in config.json)");
    }

    if let Err(errors) = config.validate() {
        eprintln!("\n  \x1b[31m❌ Configuration errors:\x1b[0m");
        for e in &errors {
            eprintln!("     • {}", e);
        }
        eprintln!();
        anyhow::bail!("Fix the above {} error(s) in config.json", errors.len());
    }

    Ok(config)
}

/// Build the agent: provider adapter, built-in functions, and loop settings.
fn setup_agent(config: &Config, model_override: Option<&str>) -> Result<ChatAgent> {
    let client = reqwest::Client::new();
    let provider = provider::from_config(config, client)?;

    let mut functions = FunctionRegistry::new();
    functions.register(Box::new(CurrentTimeFunction));
    tracing::debug!(functions = ?functions.names(), "Functions available");

    let mut orchestration = config.orchestration();
    if let Some(model) = model_override {
        orchestration.model = model.to_string();
    }

    Ok(ChatAgent::new(provider, functions, orchestration))
}

// ── Chat Command ────────────────────────────────────────────────────

async fn cmd_chat(model_override: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let agent = setup_agent(&config, model_override)?;

    println!();
    println!("  💬 chatagent v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Provider: {} | Model: {}",
        agent.provider().name(),
        agent.config().model
    );
    println!();
    println!("  Type your message, or /quit to exit.");
    println!("  ─────────────────────────────────────");
    println!();

    let mut conversation = Conversation::new();
    let stdin = io::stdin();
    loop {
        print!("  \x1b[36m>\x1b[0m ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("  Goodbye! 👋");
                break;
            }
            "/clear" => {
                conversation.clear();
                println!("  Conversation cleared.");
                continue;
            }
            "/history" => {
                println!("{}", serde_json::to_string_pretty(conversation.messages())?);
                continue;
            }
            "/status" => {
                cmd_status()?;
                continue;
            }
            _ => {}
        }

        println!();
        match agent.ask(&mut conversation, input).await {
            Ok(reply) => println!("  \x1b[32m{}\x1b[0m\n", reply),
            Err(e) => eprintln!("  \x1b[31mError: {}\x1b[0m\n", e),
        }
    }

    Ok(())
}

// ── Ask Command ─────────────────────────────────────────────────────

async fn cmd_ask(message: &str, model_override: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let agent = setup_agent(&config, model_override)?;

    let mut conversation = Conversation::new();
    let reply = agent.ask(&mut conversation, message).await?;
    println!("{}", reply);
    Ok(())
}

// ── Onboard Command ─────────────────────────────────────────────────

fn cmd_onboard() -> Result<()> {
    let path = Config::write_default_template()?;
    println!();
    println!("  ✅ Configuration created at:");
    println!("     {}", path.display());
    println!();
    println!("  Next steps:");
    println!("  1. Edit the config file (or set OPENAI_API_KEY / AZURE_OPENAI_* env vars)");
    println!("  2. Run `chatagent chat` to start chatting");
    println!();
    Ok(())
}

// ── Status Command ──────────────────────────────────────────────────

fn cmd_status() -> Result<()> {
    let config_path = Config::default_path();
    let config = Config::load()?;

    println!();
    println!("  💬 chatagent status");
    println!("  ─────────────────────────────────────");

    if config_path.exists() {
        println!("  Config:    {}", config_path.display());
    } else {
        println!("  Config:    ⚠️  Not found, using defaults and env (run `chatagent onboard`)");
    }

    println!("  Enabled:   {}", if config.enabled { "yes" } else { "no" });

    match config.provider_config() {
        Ok(provider_config) => {
            let adapter = provider::from_provider_config(&provider_config, reqwest::Client::new());
            println!("  Provider:  {}", provider_config.kind());
            println!("  Endpoint:  {}", adapter.endpoint());
            println!("  Key:       {}", mask(credential(&provider_config)));
        }
        Err(e) => println!("  Provider:  ❌ {}", e),
    }

    println!("  Model:     {}", config.chat.model);

    match config.validate() {
        Ok(()) => println!("  Status:    ✅ ready"),
        Err(errors) => {
            for e in errors {
                println!("  Status:    ❌ {}", e);
            }
        }
    }

    println!();
    Ok(())
}

fn credential(config: &ProviderConfig) -> &str {
    match config {
        ProviderConfig::OpenAi(s) => &s.api_key,
        ProviderConfig::Azure(s) => &s.api_key,
    }
}

fn mask(secret: &str) -> String {
    let len = secret.chars().count();
    match len {
        0 => "(not set)".into(),
        1..=8 => "••••".into(),
        _ => {
            let tail: String = secret.chars().skip(len - 4).collect();
            format!("••••{}", tail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_hides_short_and_long_secrets() {
        assert_eq!(mask(""), "(not set)");
        assert_eq!(mask("abc"), "••••");
        assert_eq!(mask("sk-1234567890abcd"), "••••abcd");
    }

    #[test]
    fn test_cli_parses_ask() {
        let cli = Cli::parse_from(["chatagent", "ask", "hello", "--model", "gpt-4o"]);
        match cli.command {
            Some(Commands::Ask { message, model }) => {
                assert_eq!(message, "hello");
                assert_eq!(model.as_deref(), Some("gpt-4o"));
            }
            _ => panic!("expected ask"),
        }
    }
}
