//! Taskmate main binary.

mod assistant;
mod config;
mod fallback;
mod gate;
mod plan;

use crate::assistant::{AgentError, AssistantAgent, TurnReply};
use crate::config::TaskmateConfig;
use crate::fallback::LlmTimeInterpreter;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tm_jobs::InMemoryJobBackend;
use tm_llm::{LlmClient, LlmProvider};
use tm_time::TimeResolver;
use tm_tools::{ReminderStore, Toolbox};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

const DUE_REMINDER_POLL: Duration = Duration::from_secs(15);

#[derive(Debug, Parser)]
#[command(name = "taskmate", version, about = "Taskmate to-do and reminder assistant")]
struct Cli {
    /// Config file (default: ~/.taskmate/config.toml).
    #[arg(long, global = true, env = "TASKMATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Chat with the assistant on stdin (default).
    Chat {
        /// IANA zone used until the user stores one.
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Resolve a time expression and print the UTC instant.
    Resolve {
        expression: String,
        #[arg(long)]
        timezone: Option<String>,
        /// Reference instant (RFC 3339); defaults to now.
        #[arg(long)]
        reference: Option<String>,
    },
    /// Validate config and report what is missing.
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or(Command::Chat { timezone: None });

    match command {
        Command::Chat { timezone } => chat(cli.config, timezone).await,
        Command::Resolve {
            expression,
            timezone,
            reference,
        } => resolve(&expression, timezone.as_deref(), reference.as_deref()),
        Command::Doctor => doctor(cli.config).await,
    }
}

async fn chat(config: Option<PathBuf>, timezone: Option<String>) -> anyhow::Result<()> {
    let cfg = TaskmateConfig::load(config).await?;
    if let Some(zone) = timezone.as_deref() {
        tm_time::parse_zone(Some(zone)).map_err(|e| anyhow::anyhow!("--timezone: {e}"))?;
    }
    let api_key = cfg.api_key().ok_or_else(|| {
        anyhow::anyhow!("no API key: set OPENAI_API_KEY or keys.openai_api_key in the config")
    })?;

    let llm: Arc<dyn LlmProvider> = Arc::new(LlmClient::new(
        &api_key,
        &cfg.general.model,
        cfg.general.api_base.as_deref(),
    ));
    let backend = Arc::new(InMemoryJobBackend::new());
    let toolbox = Toolbox::in_memory(backend.clone(), &cfg.reminders.job_namespace)
        .with_fallback(Arc::new(LlmTimeInterpreter::new(llm.clone())));
    let registry = toolbox
        .registry()
        .map_err(|e| anyhow::anyhow!("build function registry: {e}"))?;
    let agent = AssistantAgent::new(&cfg, llm);

    let shutdown = CancellationToken::new();
    let firing = tokio::spawn(fire_due_reminders(
        backend,
        toolbox.reminders.clone(),
        shutdown.clone(),
    ));

    let owner = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
    tracing::info!(
        owner = %owner,
        model = %cfg.general.model,
        timezone = ?timezone,
        "chat session started"
    );
    println!("taskmate ({}). Type a message; /quit to exit, ctrl-c cancels a running turn.", cfg.general.model);

    let mut history = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        let mark = history.len();
        let cancel = CancellationToken::new();
        let result = {
            let turn = agent.run_turn(
                line,
                &mut history,
                &registry,
                &owner,
                timezone.as_deref(),
                &cancel,
            );
            tokio::pin!(turn);
            tokio::select! {
                result = &mut turn => result,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    turn.await
                }
            }
        };

        match result {
            Ok(reply) => print_reply(&reply),
            Err(AgentError::Cancelled) => {
                history.truncate(mark);
                println!("(cancelled)");
            }
            Err(e) => {
                history.truncate(mark);
                tracing::error!(error = %e, "assistant turn failed");
                println!("error: {e}");
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = firing.await {
        tracing::warn!(error = %e, "reminder firing task ended abnormally");
    }
    Ok(())
}

fn print_reply(reply: &TurnReply) {
    println!("{}", reply.final_reply);
    for action in &reply.actions_taken {
        let status = if action.blocked {
            "blocked"
        } else if action.success {
            "ok"
        } else {
            "failed"
        };
        match &action.error {
            Some(error) => println!("  [{status}] {}: {error}", action.call_key()),
            None => println!("  [{status}] {}", action.call_key()),
        }
    }
}

async fn fire_due_reminders(
    backend: Arc<InMemoryJobBackend>,
    reminders: Arc<dyn ReminderStore>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(DUE_REMINDER_POLL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }
        for job in backend.take_due(Utc::now()) {
            match reminders.get_by_job_id(&job.job_id).await {
                Ok(due) => {
                    tracing::info!(
                        job_id = %job.job_id,
                        trigger_at = %job.trigger_at,
                        reminders = due.len(),
                        "reminder job fired"
                    );
                    for reminder in due {
                        println!("\n[reminder for {}] {}", reminder.owner, reminder.message);
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, error = %e, "reminder lookup failed for fired job");
                }
            }
        }
    }
}

fn resolve(expression: &str, timezone: Option<&str>, reference: Option<&str>) -> anyhow::Result<()> {
    let reference = match reference {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| anyhow::anyhow!("--reference {raw:?}: {e}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    match TimeResolver::new().resolve_detailed(expression, reference, timezone) {
        Ok(resolution) => {
            println!("{}", resolution.instant.to_rfc3339());
            tracing::debug!(source = ?resolution.source, "expression resolved");
            Ok(())
        }
        Err(failure) => Err(anyhow::anyhow!("could not resolve {expression:?}: {failure}")),
    }
}

async fn doctor(config: Option<PathBuf>) -> anyhow::Result<()> {
    let cfg = TaskmateConfig::load(config).await?;
    println!("config: ok");
    println!("model: {}", cfg.general.model);
    println!(
        "api base: {}",
        cfg.general
            .api_base
            .as_deref()
            .unwrap_or(tm_llm::DEFAULT_API_BASE)
    );
    println!(
        "gate: {} calls per turn, stop after {} identical calls",
        cfg.gate.max_calls_per_turn, cfg.gate.max_identical_calls
    );
    println!("job namespace: {}", cfg.reminders.job_namespace);
    if cfg.api_key().is_some() {
        println!("api key: present");
        Ok(())
    } else {
        println!("api key: missing (set OPENAI_API_KEY or keys.openai_api_key)");
        Err(anyhow::anyhow!("doctor found problems"))
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new(
            "info,taskmate=debug,tm_app=debug,tm_tools=debug,tm_jobs=debug,tm_llm=debug",
        ),
    };
    let log_format = std::env::var("TASKMATE_LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .to_ascii_lowercase();

    // stdout belongs to the chat session.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);
    match log_format.as_str() {
        "json" => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .init(),
        "pretty" => builder.pretty().init(),
        "compact" => builder.compact().init(),
        other => {
            return Err(anyhow::anyhow!(
                "unsupported TASKMATE_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::info!(
        log_format = %log_format,
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
