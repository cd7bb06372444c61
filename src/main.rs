//! COURTSIDE entry point.
//!
//! Loads configuration, initialises structured logging, assembles the
//! council from the enabled sources, then runs one decision cycle per
//! Fact Pack file given on the command line and prints each resulting
//! record as JSON.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use courtside::config::AppConfig;
use courtside::council::anthropic::AnthropicSource;
use courtside::council::gemini::GeminiSource;
use courtside::council::openai::OpenAiSource;
use courtside::council::stats::StatsSource;
use courtside::council::{Council, SignalSource};
use courtside::engine::{DecisionEngine, InMemoryBankroll, LoggingSink};
use courtside::gate::{DecisionGate, GatePolicy};
use courtside::model::StatsEdgeModel;
use courtside::stake::{StakePolicy, StakeSizer};
use courtside::types::FactPack;

const BANNER: &str = r#"
   ____ ___  _   _ ____ _____ ____ ___ ____  _____
  / ___/ _ \| | | |  _ \_   _/ ___|_ _|  _ \| ____|
 | |  | | | | | | | |_) || | \___ \| || | | |  _|
 | |__| |_| | |_| |  _ < | |  ___) | || |_| | |___
  \____\___/ \___/|_| \_\|_| |____/___|____/|_____|

  Consensus & Decision Gate Engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        bankroll = cfg.agent.initial_bankroll,
        currency = %cfg.agent.currency,
        gate_preset = %cfg.gates.preset,
        stake_policy = %cfg.stake.policy,
        "COURTSIDE starting up"
    );

    let pack_paths: Vec<String> = std::env::args().skip(1).collect();
    if pack_paths.is_empty() {
        anyhow::bail!("usage: courtside <fact-pack.json> [fact-pack.json ...]");
    }

    let engine = build_engine(&cfg)?;

    for path in &pack_paths {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fact pack: {path}"))?;
        let pack: FactPack = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse fact pack: {path}"))?;

        info!(game_id = %pack.game.game_id, "Running decision cycle");
        let record = engine.run_cycle(&pack).await?;

        println!("{}", serde_json::to_string_pretty(&record)?);
    }

    Ok(())
}

/// Assemble the engine from configuration.
fn build_engine(cfg: &AppConfig) -> Result<DecisionEngine> {
    // The stats model always sits on the council.
    let mut sources: Vec<Arc<dyn SignalSource>> = vec![Arc::new(StatsSource::new(
        StatsEdgeModel::new(cfg.model.params()),
        cfg.sources.stats.weight,
    ))];

    // LLM sources join only when enabled and their key resolves; a
    // missing key degrades the council instead of aborting startup.
    if cfg.sources.anthropic.enabled {
        match AppConfig::resolve_env(&cfg.sources.anthropic.api_key_env) {
            Ok(key) => {
                sources.push(Arc::new(AnthropicSource::new(&cfg.sources.anthropic, key)?))
            }
            Err(e) => warn!(error = %e, "Skipping Anthropic source"),
        }
    }
    if cfg.sources.openai.enabled {
        match AppConfig::resolve_env(&cfg.sources.openai.api_key_env) {
            Ok(key) => sources.push(Arc::new(OpenAiSource::new(&cfg.sources.openai, key)?)),
            Err(e) => warn!(error = %e, "Skipping OpenAI source"),
        }
    }
    if cfg.sources.gemini.enabled {
        match AppConfig::resolve_env(&cfg.sources.gemini.api_key_env) {
            Ok(key) => sources.push(Arc::new(GeminiSource::new(&cfg.sources.gemini, key)?)),
            Err(e) => warn!(error = %e, "Skipping Gemini source"),
        }
    }

    if sources.len() < 2 {
        warn!("Only one source enabled — disagreement will always read 0.0");
    }
    info!(sources = sources.len(), "Council assembled");

    let gate = DecisionGate::new(GatePolicy::from_config(&cfg.gates)?);
    let sizer = StakeSizer::new(StakePolicy::from_config(&cfg.stake)?);
    let bankroll = Arc::new(InMemoryBankroll::new(cfg.agent.initial_bankroll));
    let sink = Arc::new(LoggingSink::new());

    Ok(DecisionEngine::new(
        Council::new(sources),
        StatsEdgeModel::new(cfg.model.params()),
        gate,
        sizer,
        bankroll,
        sink,
        cfg.agent.max_daily_exposure_pct,
    ))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("courtside=info"));

    let json_logging = std::env::var("COURTSIDE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
