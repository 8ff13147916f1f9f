use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tokio::io::AsyncBufReadExt;

use helm_core::events::{ResultKind, StreamingResult};
use helm_core::queue::Command;
use helm_core::SteeringConfig;
use helm_llm::{HttpModelClient, ModelClient};
use helm_runtime::SteeringSystem;
use helm_tools::BuiltinToolEngine;

#[derive(Parser)]
#[command(name = "helm")]
#[command(about = "Interactive front-end for the steering core")]
#[command(version)]
struct Cli {
    /// API key for the model backend
    #[arg(long, env = "AI_API_KEY")]
    api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[arg(long, default_value = "https://api.openai.com/v1")]
    api_base: String,

    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,

    /// Secondary model used after the first retryable failure
    #[arg(long)]
    fallback_model: Option<String>,

    /// JSON file overriding the default steering configuration
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

fn load_config(path: Option<&std::path::Path>) -> Result<SteeringConfig, String> {
    let Some(path) = path else {
        return Ok(SteeringConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .map_err(|error| format!("cannot read {}: {error}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|error| format!("invalid config {}: {error}", path.display()))
}

#[tokio::main]
async fn main() {
    env_logger::init();
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    let Some(api_key) = cli.api_key else {
        eprintln!("error: no API key provided (use --api-key or AI_API_KEY)");
        return 1;
    };
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("error: {error}");
            return 1;
        }
    };

    let connect_timeout = std::time::Duration::from_millis(config.model_connect_timeout_ms);
    let read_timeout = std::time::Duration::from_millis(config.model_read_timeout_ms);
    let build_client = |name: &str| {
        HttpModelClient::with_timeouts(&cli.api_base, &api_key, name, connect_timeout, read_timeout)
    };

    let model: Arc<dyn ModelClient> = match build_client(&cli.model) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            eprintln!("error: failed to build model client: {error}");
            return 1;
        }
    };
    let fallback: Option<Arc<dyn ModelClient>> = match &cli.fallback_model {
        Some(name) => match build_client(name) {
            Ok(client) => Some(Arc::new(client)),
            Err(error) => {
                eprintln!("error: failed to build fallback client: {error}");
                return 1;
            }
        },
        None => None,
    };

    let steering = SteeringSystem::with_parts(
        model,
        fallback,
        Arc::new(BuiltinToolEngine::with_builtins()),
        None,
        config,
    );
    if let Err(error) = steering.start() {
        eprintln!("error: {error}");
        return 1;
    }

    let printer = tokio::spawn({
        let output = steering.output();
        async move {
            loop {
                match output.read().await {
                    Ok(message) if message.done => break,
                    Ok(message) => {
                        if let Some(result) = message.value {
                            print_result(&result);
                        }
                    }
                    Err(error) => eprintln!("! pipe error: {error}"),
                }
            }
        }
    });

    println!("helm — type a directive, /calc /read /search for tools, 'quit' to exit");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                eprintln!("stdin error: {error}");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" {
            break;
        }

        let sent = if let Some(rest) = trimmed.strip_prefix("/calc ") {
            steering.send_command(Command::prompt(format!("Calculate {rest}")))
        } else if let Some(rest) = trimmed.strip_prefix("/read ") {
            steering.send_command(Command::prompt(format!("Read {rest}")))
        } else if let Some(rest) = trimmed.strip_prefix("/search ") {
            steering.send_command(Command::prompt(format!("Search {rest}")))
        } else {
            steering.send_input(format!("{line}\n"))
        };
        if sent.is_err() {
            break;
        }
    }

    steering.close().await;
    let _ = printer.await;
    0
}

fn print_result(result: &StreamingResult) {
    match result.kind {
        ResultKind::StreamStart => {}
        ResultKind::Assistant => println!("assistant> {}", result.content),
        ResultKind::ToolResult => println!("tool> {}", result.content),
        ResultKind::SystemResult => println!("system> {}", result.content),
        ResultKind::Error => eprintln!("error> {}", result.content),
        ResultKind::Compaction
        | ResultKind::CompactionSummary
        | ResultKind::Info
        | ResultKind::ModelFallback => {
            log::info!("[{}] {}", result.kind.as_str(), result.content);
        }
    }
}
