//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - simulate: replay scripted turns through the orchestrator
//! - inspect: show a persisted session and its tracked concepts
//! - sessions: list persisted sessions
//! - config show / check: print or validate the effective configuration

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::orchestrator::{restore_session, TurnInput, TurnOrchestrator, TurnOutcome};
use crate::scoring::compile_strategies;
use crate::session::{MemorySessionStore, SessionStore};
use crate::signals::HeuristicQualityDetector;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Read a simulation script: a JSON array of turn inputs
pub fn load_script(path: &Path) -> Result<Vec<TurnInput>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse script {}", path.display()))
}

/// Replay a script of turns against one session
///
/// Stops early when the engine decides the conversation should end.
pub async fn handle_simulate(
    script: &Path,
    session: Option<String>,
    ephemeral: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let turns = load_script(script)?;
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let database = if ephemeral {
        None
    } else {
        Some(
            Database::new(&config.session_db_path())
                .await
                .context("Failed to open session database")?,
        )
    };
    let store: Arc<dyn SessionStore> = match &database {
        Some(db) => Arc::new(db.sessions()),
        None => Arc::new(MemorySessionStore::new()),
    };
    let quality = Arc::new(HeuristicQualityDetector::new()?);
    let orchestrator = TurnOrchestrator::new(Arc::new(config.clone()), store, quality);

    let mut outcomes = Vec::with_capacity(turns.len());
    for input in turns {
        let outcome = orchestrator.run_turn(&session_id, input).await?;
        let stop = !outcome.continuation.should_continue();
        if let OutputFormat::Text = format {
            print_outcome(&outcome);
        }
        outcomes.push(outcome);
        if stop {
            break;
        }
    }

    if let OutputFormat::Json = format {
        let output = json!({
            "session_id": session_id,
            "turns": outcomes,
            "count": outcomes.len(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    if let Some(db) = database {
        db.close().await?;
    }
    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) {
    println!(
        "Turn {}: {} ({}) -> {}",
        outcome.turn,
        outcome.strategy,
        outcome.technique,
        outcome.focus_concept.as_deref().unwrap_or("-")
    );
    println!(
        "  Phase: {}  Saturation: {:.2}  Next: {:?}",
        outcome.phase, outcome.saturation.score, outcome.continuation
    );
    for candidate in outcome.ranking.candidates.iter().take(3) {
        println!(
            "  #{} {:<14} {:<10} base {:>6.3}  x{:.2} +{:.2}  = {:>6.3}",
            candidate.rank,
            candidate.strategy,
            candidate.concept_id.as_deref().unwrap_or("-"),
            candidate.base_score,
            candidate.multiplier,
            candidate.bonus,
            candidate.final_score
        );
    }
    for degradation in &outcome.degradations {
        println!("  ! {}", degradation);
    }
    println!();
}

/// Show a persisted session
pub async fn handle_inspect(session_id: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.session_db_path())
        .await
        .context("Failed to open session database")?;

    let persisted = database
        .sessions()
        .load(session_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Session not found: {}", session_id))?;
    let restored = restore_session(
        session_id,
        Some(persisted),
        config.session.response_depth_history_len,
    );
    let session = &restored.session;
    let tracker = &restored.tracker;

    match format {
        OutputFormat::Text => {
            println!("Session: {}", session.session_id);
            println!("  Turn: {}", session.turn);
            println!("  Phase: {}", session.phase);
            println!(
                "  Focus: {}",
                session.previous_focus.as_deref().unwrap_or("-")
            );
            println!(
                "  Recent strategies: {}",
                session
                    .strategy_history
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            for degradation in &restored.degradations {
                println!("  ! {}", degradation);
            }
            println!();
            println!("Concepts ({}):", tracker.len());
            for state in tracker.states() {
                println!(
                    "  {:<16} focus {:>2}  streak {:>2}  yield {:>2} ({:.2})  edges {}/{}",
                    state.concept_id,
                    state.focus_count,
                    state.current_focus_streak,
                    state.yield_count,
                    state.yield_rate,
                    state.edges_out,
                    state.edges_in
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "session": session,
                "concepts": tracker.states().collect::<Vec<_>>(),
                "degradations": restored.degradations,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// List persisted sessions
pub async fn handle_sessions(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.session_db_path())
        .await
        .context("Failed to open session database")?;
    let sessions = database.sessions().list(limit as i64).await?;

    match format {
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("No sessions stored");
            } else {
                println!("Sessions (last {}):", limit);
                for summary in &sessions {
                    let updated = chrono::DateTime::from_timestamp(summary.updated_at, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "Unknown".to_string());
                    println!("  {}  turn {:>3}  updated {}", summary.id, summary.turn, updated);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "sessions": sessions,
                "count": sessions.len(),
                "limit": limit,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Print the effective configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", toml::to_string_pretty(config)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

/// Report strategies and any weight keys that compile away
///
/// The configuration has already been validated when it was loaded; this
/// only surfaces the non-fatal problems.
pub fn handle_config_check(config: &Config, format: OutputFormat) -> Result<()> {
    let strategies = compile_strategies(&config.strategies);
    let ignored: Vec<_> = strategies
        .iter()
        .filter(|s| !s.ignored_keys.is_empty())
        .map(|s| (s.name.as_str(), s.ignored_keys.as_slice()))
        .collect();

    match format {
        OutputFormat::Text => {
            println!("Configuration: Valid");
            println!("Strategies ({}):", strategies.len());
            for strategy in &strategies {
                println!(
                    "  {:<14} {:<12} {:?}, {} weights",
                    strategy.name,
                    strategy.technique,
                    strategy.node_binding,
                    strategy.weights.len()
                );
            }
            for (name, keys) in &ignored {
                println!("  ! {} ignores unknown keys: {}", name, keys.join(", "));
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "valid": true,
                "strategies": strategies.iter().map(|s| &s.name).collect::<Vec<_>>(),
                "ignored_keys": ignored
                    .iter()
                    .map(|(name, keys)| json!({ "strategy": name, "keys": keys }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
