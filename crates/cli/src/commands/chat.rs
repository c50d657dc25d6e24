//! `freshmate chat`: Interactive or single-message chat mode.

use freshmate_agent::{TurnOutcome, TurnRequest};
use freshmate_config::AppConfig;
use freshmate_core::{AuthContext, ThreadId};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn run(
    token: String,
    thread: Option<String>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if config.model.api_key.is_none() {
        eprintln!();
        eprintln!("  ERROR: No model API key configured!");
        eprintln!();
        eprintln!("  Set FRESHMATE_MODEL_API_KEY or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No model API key found. See above for setup instructions.".into());
    }

    let auth = AuthContext::explicit(token)?;
    let thread_id = thread.map(ThreadId::from).unwrap_or_else(ThreadId::new);
    let service = freshmate_gateway::build_service(&config)?;
    tracing::debug!(thread_id = %thread_id, token = %auth.fingerprint(), "Chat session started");

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let outcome = service
            .handle_turn(TurnRequest::new(thread_id, msg, auth))
            .await?;
        eprint!("\r              \r");
        match outcome {
            TurnOutcome::Finished { answer } => println!("{answer}"),
            TurnOutcome::Aborted { reason } => return Err(format!("turn aborted: {reason}").into()),
        }
        return Ok(());
    }

    println!();
    println!("  Freshmate: Interactive Mode");
    println!();
    println!("  Model:     {}", config.model.model);
    println!("  Thread:    {thread_id}");
    println!("  History:   {:?}", config.history.backend);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"  You > ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        eprint!("  ...");
        let request = TurnRequest::new(thread_id.clone(), line, auth.clone());
        let result = service.handle_turn(request).await;
        eprint!("\r     \r");

        match result {
            Ok(TurnOutcome::Finished { answer }) => {
                println!();
                for l in answer.lines() {
                    println!("  Freshmate > {l}");
                }
                println!();
            }
            Ok(TurnOutcome::Aborted { reason }) => {
                eprintln!("  [Aborted] {reason}");
                println!();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
