//! Generate four tonal message variants for a conversation context.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Context from a JSON file
//! spur context.json
//!
//! # Context piped from stdin
//! cat context.json | spur --stdin
//!
//! # Cold open with a topic
//! spur --topic "travel photos" --situation cold_open
//!
//! # Different model, tighter deadline
//! spur context.json --model anthropic/claude-sonnet-4 --deadline 30
//! ```

use clap::Parser;
use spur_engine::prelude::*;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Generate four tonal message variants for a conversation context.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "spur")]
struct Cli {
    /// Path to a JSON context file (history, profiles, traits, overrides)
    context: Option<PathBuf>,

    /// Read the JSON context from stdin
    #[arg(long)]
    stdin: bool,

    /// Conversation situation (e.g. cold_open, recovery, topic_pivot)
    #[arg(long)]
    situation: Option<String>,

    /// Conversation topic to steer toward
    #[arg(long)]
    topic: Option<String>,

    /// Model to use for generation
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Maximum regeneration attempts per variant slot
    #[arg(long, default_value_t = 2)]
    max_retries: u32,

    /// Per-call timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Whole-request deadline in seconds
    #[arg(long, default_value_t = 90)]
    deadline: u64,

    /// Path to a JSON guardrail catalog (default: built-in rules)
    #[arg(long)]
    guardrails: Option<PathBuf>,

    /// Print the response as JSON instead of labeled sections
    #[arg(long)]
    json: bool,

    /// Log engine internals to stderr
    #[arg(long)]
    verbose: bool,
}

fn load_request(cli: &Cli) -> Result<SpurRequest, String> {
    let raw = match (&cli.context, cli.stdin) {
        (Some(path), false) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        (None, true) => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            buf
        }
        (Some(_), true) => return Err("pass a context file or --stdin, not both".into()),
        (None, false) => String::new(),
    };

    let mut request: SpurRequest = if raw.trim().is_empty() {
        SpurRequest::default()
    } else {
        serde_json::from_str(&raw).map_err(|e| format!("invalid context JSON: {e}"))?
    };

    if let Some(ref situation) = cli.situation {
        let parsed: Situation =
            serde_json::from_value(serde_json::Value::String(situation.clone()))
                .map_err(|_| format!("unknown situation \"{situation}\""))?;
        request.situation = Some(parsed);
    }
    if let Some(ref topic) = cli.topic {
        request.topic = Some(topic.clone());
    }
    Ok(request)
}

fn build_validator(cli: &Cli) -> Result<Validator, String> {
    let catalog = match &cli.guardrails {
        Some(path) => GuardrailCatalog::from_path(path)
            .map_err(|e| format!("failed to load guardrails from {}: {e}", path.display()))?,
        None => GuardrailCatalog::builtin(),
    };
    Ok(Validator::new(
        Default::default(),
        catalog,
        Box::new(spur_engine::validate::EditTokenSimilarity),
    ))
}

fn print_response(cli: &Cli, response: &SpurResponse) -> Result<(), String> {
    if cli.json {
        let mut variants = serde_json::Map::new();
        for (variant, text) in &response.variants {
            variants.insert(variant.label().to_string(), serde_json::json!(text));
        }
        let out = serde_json::json!({
            "variants": variants,
            "warnings": response
                .warnings
                .iter()
                .map(|w| w.to_string())
                .collect::<Vec<_>>(),
            "guardrail_version": response.guardrail_version,
        });
        let rendered = serde_json::to_string_pretty(&out)
            .map_err(|e| format!("failed to format response: {e}"))?;
        println!("{rendered}");
        return Ok(());
    }

    for (variant, text) in &response.variants {
        println!("[{variant}]");
        println!("{text}");
        println!();
    }
    for warning in &response.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<(), String> {
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;

    let request = load_request(cli)?;
    let validator = build_validator(cli)?;

    let client = OpenRouterClient::new(api_key).map_err(|e| e.to_string())?;
    let generator = Arc::new(
        OpenRouterGenerator::new(client, &cli.model)
            .with_timeout(Duration::from_secs(cli.timeout)),
    );

    let policy = SelectionPolicy::default()
        .with_max_slot_retries(cli.max_retries)
        .with_call_timeout(Duration::from_secs(cli.timeout))
        .with_request_deadline(Duration::from_secs(cli.deadline));

    let engine = SpurEngine::new(generator)
        .with_validator(validator)
        .with_policy(policy);

    let response = engine.run(request).await.map_err(|e| e.to_string())?;
    print_response(cli, &response)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false);
        tracing_subscriber::registry().with(fmt_layer).init();
    }

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
