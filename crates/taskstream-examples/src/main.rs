//! Replays a JSON-lines script of stream events into one task and prints the
//! resulting view after every line.
//!
//! Each line is either a `StreamEvent` (`{"type":"message_start",...}`) or a
//! pause (`{"delay_ms": 200}`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use taskstream_core::prelude::*;
use taskstream_core::{HttpLookupConfig, StaticArtifactLookup, init_observability};

#[derive(Parser, Debug)]
#[command(name = "taskstream-replay")]
#[command(about = "Replay recorded task stream events and print the reconciled view")]
struct Cli {
    /// JSON-lines script to replay
    #[arg(long)]
    script: PathBuf,
    /// Task to observe
    #[arg(long, default_value = "task-1")]
    task_id: String,
    /// Agent that owns the task
    #[arg(long)]
    agent_id: Option<String>,
    /// Project the task belongs to
    #[arg(long)]
    project_id: Option<String>,
    /// Console backend used for artifact lookup (defaults to TASKSTREAM_API_BASE_URL)
    #[arg(long)]
    api_base_url: Option<String>,
    /// How long to wait for artifacts after the script ends; defaults to the
    /// full retry backoff plus one second. Only used with --project-id and --agent-id.
    #[arg(long)]
    artifact_wait_ms: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptLine {
    Pause {
        delay_ms: u64,
    },
    Event(StreamEvent),
}

fn load_env() {
    if let Ok(path) = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join(".env")
        .canonicalize()
    {
        let _ = dotenvy::from_path(path);
    }
    let _ = dotenvy::dotenv();
}

fn artifact_lookup(cli: &Cli) -> Result<Arc<dyn ArtifactLookup>, EngineError> {
    let base_url = cli
        .api_base_url
        .clone()
        .or_else(|| std::env::var("TASKSTREAM_API_BASE_URL").ok())
        .filter(|url| !url.trim().is_empty());
    match base_url {
        Some(url) => {
            let mut config = HttpLookupConfig::new(url.trim());
            if let Ok(token) = std::env::var("TASKSTREAM_API_TOKEN")
                && !token.trim().is_empty()
            {
                config = config.api_token(token.trim());
            }
            Ok(Arc::new(HttpArtifactLookup::new(config)?))
        }
        None => {
            tracing::info!(event = "replay.offline_lookup", "no api base url; artifacts stay empty");
            Ok(Arc::new(StaticArtifactLookup::new()))
        }
    }
}

/// Waits for the retrieval loop to store artifacts or run out of budget.
async fn wait_for_artifacts(task: &TaskStream, budget: Duration) {
    let mut rx = task.subscribe_state();
    let found = tokio::time::timeout(budget, rx.wait_for(|state| !state.artifacts.is_empty())).await;
    if !matches!(found, Ok(Ok(_))) {
        tracing::info!(
            event = "replay.artifact_wait_elapsed",
            budget_ms = budget.as_millis() as u64
        );
    }
}

fn print_view(label: &str, view: &TaskView) -> Result<(), Box<dyn std::error::Error>> {
    println!("{label}: {}", serde_json::to_string(view)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env();
    init_observability();
    let cli = Cli::parse();

    let config = EngineConfig::from_env()?;
    let settle = config.display_delay + Duration::from_millis(50);
    let policy = &config.artifact_retry;
    let artifact_budget = cli.artifact_wait_ms.map(Duration::from_millis).unwrap_or_else(|| {
        (1..=policy.max_attempts)
            .map(|attempt| policy.delay_before(attempt))
            .sum::<Duration>()
            + Duration::from_secs(1)
    });
    let hub = StreamHub::new(EventBus::new(), artifact_lookup(&cli)?, config);

    let mut options = TaskOptions::assistant(cli.task_id.as_str());
    if let Some(project) = &cli.project_id {
        options = options.project(project.as_str());
    }
    if let Some(agent) = &cli.agent_id {
        options = options.agent(agent.as_str());
    }
    let task = hub.open(options)?;

    let script = std::fs::read_to_string(&cli.script)?;
    for (index, line) in script.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed: ScriptLine = serde_json::from_str(line)
            .map_err(|e| format!("{}:{}: {e}", cli.script.display(), index + 1))?;
        match parsed {
            ScriptLine::Pause { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            ScriptLine::Event(event) => {
                let kind = event.kind();
                hub.publish(&event);
                print_view(kind.as_str(), &task.view())?;
            }
        }
    }

    tokio::time::sleep(settle).await;
    if cli.project_id.is_some() && cli.agent_id.is_some() {
        wait_for_artifacts(&task, artifact_budget).await;
    }
    println!("final: {}", serde_json::to_string_pretty(&task.view())?);
    hub.dispose_all();
    Ok(())
}
