//! `cardsmith ask` — Answer one question.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, bail};
use cardsmith_agent::{AgentError, AgentLoop};
use cardsmith_config::AppConfig;
use cardsmith_core::agent::AgentConfig;
use cardsmith_core::event::{DomainEvent, EventBus};
use cardsmith_telemetry::UsageLedger;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Command-line overrides for the `[agent]` section.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub max_iterations: Option<u32>,
    pub max_tool_calls: Option<u32>,
    pub timeout_secs: Option<u64>,
}

pub async fn run(question: &str, overrides: Overrides) -> anyhow::Result<()> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }

    let config = AppConfig::load().context("Failed to load config")?;

    if !config.has_api_key() && !cardsmith_providers::is_local(&config.default_provider) {
        eprintln!();
        eprintln!("  ERROR: No API key configured for '{}'", config.default_provider);
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENROUTER_API_KEY   (recommended)");
        eprintln!("    OPENAI_API_KEY");
        eprintln!("    ANTHROPIC_API_KEY");
        eprintln!("    CARDSMITH_API_KEY    (generic)");
        eprintln!();
        eprintln!("  Or add it to {}", AppConfig::config_path().display());
        eprintln!();
        bail!("No API key found. See above for setup instructions.");
    }

    let mut agent_config = config.agent_config();
    apply_overrides(&mut agent_config, &overrides)?;
    let timeout_secs = overrides.timeout_secs.or(config.agent.timeout_secs);

    let provider = cardsmith_providers::build_from_config(&config)?;
    let tools = Arc::new(cardsmith_tools::default_registry(&config.search)?);
    if tools.is_empty() {
        eprintln!("  (web search disabled: set SERPER_API_KEY to enable it)");
    }

    let ledger = Arc::new(if config.telemetry.enabled {
        UsageLedger::new()
    } else {
        UsageLedger::disabled()
    });
    let event_bus = Arc::new(EventBus::default());
    let progress = spawn_progress(&event_bus);

    let agent = AgentLoop::new(provider, tools, agent_config)
        .with_event_bus(event_bus)
        .with_usage_sink(ledger.clone());

    let cancel = CancellationToken::new();
    let guard = spawn_cancellers(&cancel, timeout_secs);

    info!(provider = %config.default_provider, model = %agent.config().model, "Asking");
    let outcome = agent.run(question, &cancel).await;
    drop(agent);
    // The bus closes once the agent is gone, which ends the progress task.
    let _ = progress.await;

    match outcome {
        Ok(completion) => {
            println!("{}", completion.text.trim());
            eprintln!();
            eprintln!(
                "  [{} iteration(s), {} search(es)]",
                completion.iterations_used, completion.tool_calls_used
            );
            if ledger.is_enabled() {
                let totals = ledger.totals();
                if totals.completions > totals.completions_without_usage {
                    eprintln!(
                        "  [tokens: {} prompt + {} completion = {}]",
                        totals.prompt_tokens, totals.completion_tokens, totals.total_tokens
                    );
                }
            }
            Ok(())
        }
        Err(AgentError::Cancelled) => match timeout_secs {
            Some(secs) if !guard.interrupted() => bail!("Gave up after {secs}s"),
            _ => bail!("Cancelled"),
        },
        Err(e) => Err(e.into()),
    }
}

/// Apply command-line budget overrides.
fn apply_overrides(config: &mut AgentConfig, overrides: &Overrides) -> anyhow::Result<()> {
    if let Some(n) = overrides.max_iterations {
        if n == 0 {
            bail!("--max-iterations must be at least 1");
        }
        config.max_iterations = n;
    }
    if let Some(n) = overrides.max_tool_calls {
        config.max_tool_calls = n;
    }
    if overrides.timeout_secs == Some(0) {
        bail!("--timeout must be at least 1 second");
    }
    Ok(())
}

/// Cancels the question on Ctrl-C or when the timeout elapses. Dropping
/// the guard stops both watchers.
struct CancelGuard {
    watchers: Vec<tokio::task::JoinHandle<()>>,
    interrupted: Arc<AtomicBool>,
}

impl CancelGuard {
    fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        for watcher in &self.watchers {
            watcher.abort();
        }
    }
}

fn spawn_cancellers(cancel: &CancellationToken, timeout_secs: Option<u64>) -> CancelGuard {
    let interrupted = Arc::new(AtomicBool::new(false));
    let mut watchers = Vec::new();

    let token = cancel.clone();
    let flag = interrupted.clone();
    watchers.push(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ctrl-C received, cancelling question");
            flag.store(true, Ordering::SeqCst);
            token.cancel();
        }
    }));

    if let Some(secs) = timeout_secs {
        let token = cancel.clone();
        watchers.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            debug!(timeout_secs = secs, "Question timed out, cancelling");
            token.cancel();
        }));
    }

    CancelGuard {
        watchers,
        interrupted,
    }
}

/// Print tool activity to stderr while the question runs.
fn spawn_progress(event_bus: &Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = progress_line(&event) {
                        eprintln!("{line}");
                    }
                    if matches!(*event, DomainEvent::AgentFinished { .. }) {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn progress_line(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::ToolExecuted {
            tool_name,
            success,
            duration_ms,
            ..
        } => {
            let status = if *success { "ok" } else { "failed" };
            Some(format!("  - {tool_name} {status} ({duration_ms}ms)"))
        }
        DomainEvent::CorrectionInjected { skipped_calls, .. } if !skipped_calls.is_empty() => {
            Some(format!(
                "  - search budget spent, {} request(s) skipped",
                skipped_calls.len()
            ))
        }
        _ => None,
    }
}
