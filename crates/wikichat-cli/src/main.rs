//! wikichat - terminal client for the wikichat question-answering agent

mod commands;
mod config;
mod printer;
mod utils;

use clap::Parser;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use wikichat_api::{ChatClient, Endpoints};
use wikichat_session::{
    BusyPolicy, Error, Orchestrator, OrchestratorConfig, ReplyMode, SubmitOutcome,
};

use crate::commands::CommandResult;
use crate::printer::Printer;

/// wikichat - ask the wiki agent questions from the terminal
#[derive(Parser, Debug)]
#[command(name = "wikichat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL (default: http://127.0.0.1:8000)
    #[arg(short, long)]
    server: Option<String>,

    /// Ask through the single-response query endpoint instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Input handling while a reply is in progress (reject, queue, cancel)
    #[arg(long)]
    busy_policy: Option<String>,

    /// Seconds without stream activity before a reply is abandoned
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Ask a single question and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

fn parse_busy_policy(s: &str) -> Option<BusyPolicy> {
    match s.to_lowercase().as_str() {
        "reject" => Some(BusyPolicy::Reject),
        "queue" => Some(BusyPolicy::Queue),
        "cancel" | "cancel-in-flight" => Some(BusyPolicy::CancelInFlight),
        _ => None,
    }
}

fn init_tracing(verbose: bool) {
    // Logs go to stderr so they never mix with the conversation on stdout.
    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter("wikichat=debug")
            .with_writer(io::stderr)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();

    // Merge config with CLI args (CLI takes precedence)
    let server = args
        .server
        .or(cfg.server.clone())
        .unwrap_or_else(|| wikichat_api::client::DEFAULT_BASE_URL.to_string());

    let mut config = OrchestratorConfig::default();
    if args.no_stream || cfg.stream == Some(false) {
        config.mode = ReplyMode::Direct;
    }
    if let Some(policy) = args.busy_policy.or(cfg.busy_policy.clone()) {
        match parse_busy_policy(&policy) {
            Some(policy) => config.busy_policy = policy,
            None => eprintln!(
                "Warning: Unknown busy policy '{}', using reject",
                policy
            ),
        }
    }
    if let Some(secs) = args.idle_timeout.or(cfg.idle_timeout_secs) {
        config.idle_timeout = Duration::from_secs(secs.max(1));
    }
    if let Some(greeting) = cfg.greeting.clone() {
        config.greeting = greeting;
    }

    let client = match ChatClient::new(Endpoints::new(&server)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::debug!(
        "Using backend at {} ({:?})",
        client.endpoints().base_url,
        config.mode
    );

    let orchestrator = Orchestrator::new(config, Arc::new(client));

    // Non-interactive mode
    if let Some(command) = args.command {
        return run_command(orchestrator, &command).await;
    }

    run_interactive(orchestrator).await
}

async fn run_command(mut orchestrator: Orchestrator, question: &str) -> anyhow::Result<()> {
    let is_tty = io::stdout().is_terminal();
    if is_tty {
        println!("wikichat> {}", question);
        println!();
    }

    let printer = Printer::new(is_tty, false);
    let printing = tokio::spawn(printer.run(orchestrator.transcript().subscribe()));

    let submitted = orchestrator.submit(question).await;
    if submitted.is_ok() {
        orchestrator.run_until_idle().await;
    }
    let failed = match &submitted {
        // Round failures already left a notice in the transcript.
        Err(e) if e.ends_round() => true,
        Err(e) => {
            eprintln!("Error: {}", e);
            true
        }
        Ok(_) => orchestrator
            .transcript()
            .last_entry()
            .is_none_or(|entry| entry.is_error),
    };

    // Dropping the orchestrator closes the transcript channel, which ends the
    // printer once everything is written.
    drop(orchestrator);
    printing.await.ok();

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_interactive(orchestrator: Orchestrator) -> anyhow::Result<()> {
    let is_tty = io::stdout().is_terminal();

    if is_tty {
        eprintln!("wikichat (/help for commands)");
        eprintln!();
    }
    if let Some(greeting) = orchestrator.transcript().last_entry() {
        println!("{}", greeting.content);
    }

    let (handle, task) = orchestrator.spawn();
    let printing = tokio::spawn(Printer::new(is_tty, false).run(handle.subscribe_transcript()));
    let mut lines = spawn_stdin_reader();

    loop {
        if is_tty && !handle.is_busy() {
            print!("> ");
            io::stdout().flush()?;
        }

        let line = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => line,
                // EOF
                None => break,
            },
            _ = handle.wait_for_idle(), if handle.is_busy() => continue,
            _ = tokio::signal::ctrl_c() => {
                if handle.is_busy() {
                    handle.cancel();
                    continue;
                }
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if let Some(result) = commands::execute_command(input) {
            match result {
                CommandResult::Clear => {
                    handle.reset()?;
                    println!("Cleared conversation.");
                }
                CommandResult::Cancel => {
                    if handle.is_busy() {
                        handle.cancel();
                    } else {
                        println!("Nothing to cancel.");
                    }
                }
                CommandResult::History => {
                    let entries = handle.entries().await?;
                    println!("{}", commands::history_text(&entries));
                }
                CommandResult::Exit => break,
                CommandResult::Message(msg) => println!("{}", msg),
                CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            continue;
        }

        match handle.submit(input).await {
            Ok(SubmitOutcome::Started) => {}
            Ok(SubmitOutcome::Queued) => println!("[queued until the current reply ends]"),
            Err(Error::Busy) => {
                println!("A reply is still in progress. Use /cancel to stop it.");
            }
            // The failure notice is already in the transcript.
            Err(e) if e.ends_round() => {}
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    handle.shutdown()?;
    let transcript = task.await?;
    tracing::debug!("Conversation ended with {} entries", transcript.len());
    drop(handle);
    drop(transcript);
    printing.await.ok();
    Ok(())
}

/// Read stdin lines on a dedicated thread. Blocking reads would otherwise
/// hold up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
