//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::model::ModelParams;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub gates: GatesConfig,
    pub stake: StakeConfig,
    #[serde(default)]
    pub model: ModelConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub initial_bankroll: f64,
    /// Fraction of bankroll that may be exposed across one day's bets.
    pub max_daily_exposure_pct: f64,
    pub currency: String,
}

/// Gate thresholds: a named preset plus optional per-field overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct GatesConfig {
    /// "standard", "conservative", or "aggressive".
    pub preset: String,
    #[serde(default)]
    pub edge_threshold: Option<f64>,
    #[serde(default)]
    pub disagreement_threshold: Option<f64>,
    #[serde(default)]
    pub disagreement_hard_ceiling: Option<f64>,
    #[serde(default)]
    pub uncertainty_threshold: Option<f64>,
    #[serde(default)]
    pub max_odds_age_minutes: Option<i64>,
    #[serde(default)]
    pub star_uncertainty_floor: Option<f64>,
    #[serde(default)]
    pub bet_max_edge: Option<f64>,
    #[serde(default)]
    pub bet_max_consensus: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StakeConfig {
    /// "safe" (flat fraction) or "fractional_kelly".
    pub policy: String,
    /// Flat fraction staked under the safe policy.
    pub flat_fraction: f64,
    /// Kelly multiplier under the fractional policy.
    pub kelly_multiplier: f64,
    /// Hard cap on any single stake, as a fraction of bankroll.
    pub cap: f64,
}

/// Logistic model parameters; defaults to the shipped v1 set.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModelConfig {
    #[serde(default)]
    pub params: Option<ModelParams>,
}

impl ModelConfig {
    pub fn params(&self) -> ModelParams {
        self.params.clone().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    pub stats: StatsSourceConfig,
    pub anthropic: LlmSourceConfig,
    pub openai: LlmSourceConfig,
    pub gemini: LlmSourceConfig,
}

/// The stats model always sits on the council; only its weight varies.
#[derive(Debug, Deserialize, Clone)]
pub struct StatsSourceConfig {
    pub weight: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmSourceConfig {
    pub enabled: bool,
    pub weight: f64,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks that the TOML schema alone cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.agent.initial_bankroll <= 0.0 {
            anyhow::bail!("agent.initial_bankroll must be positive");
        }
        if !(0.0..=1.0).contains(&self.agent.max_daily_exposure_pct) {
            anyhow::bail!("agent.max_daily_exposure_pct must be within [0, 1]");
        }
        if !matches!(
            self.gates.preset.as_str(),
            "standard" | "conservative" | "aggressive"
        ) {
            anyhow::bail!("gates.preset must be standard, conservative, or aggressive");
        }
        if !matches!(self.stake.policy.as_str(), "safe" | "fractional_kelly") {
            anyhow::bail!("stake.policy must be safe or fractional_kelly");
        }
        if !(0.0..=1.0).contains(&self.stake.kelly_multiplier) {
            anyhow::bail!("stake.kelly_multiplier must be within [0, 1]");
        }
        if self.stake.cap <= 0.0 || self.stake.cap > 0.10 {
            anyhow::bail!("stake.cap must be within (0, 0.10]");
        }
        for (name, weight) in self.source_weights() {
            if weight < 0.0 || !weight.is_finite() {
                anyhow::bail!("sources.{name}.weight must be non-negative");
            }
        }
        Ok(())
    }

    fn source_weights(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("stats", self.sources.stats.weight),
            ("anthropic", self.sources.anthropic.weight),
            ("openai", self.sources.openai.weight),
            ("gemini", self.sources.gemini.weight),
        ]
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<SecretString> {
        let value = std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))?;
        Ok(SecretString::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
            [agent]
            name = "COURTSIDE-001"
            initial_bankroll = 10000.0
            max_daily_exposure_pct = 0.10
            currency = "USD"

            [gates]
            preset = "standard"

            [stake]
            policy = "fractional_kelly"
            flat_fraction = 0.01
            kelly_multiplier = 0.25
            cap = 0.03

            [sources.stats]
            weight = 1.0

            [sources.anthropic]
            enabled = true
            weight = 1.0
            model = "claude-sonnet-4-20250514"
            api_key_env = "ANTHROPIC_API_KEY"
            timeout_secs = 30
            max_tokens = 1024

            [sources.openai]
            enabled = true
            weight = 1.0
            model = "gpt-4o"
            api_key_env = "OPENAI_API_KEY"
            timeout_secs = 30
            max_tokens = 1024

            [sources.gemini]
            enabled = true
            weight = 1.0
            model = "gemini-2.0-flash"
            api_key_env = "GEMINI_API_KEY"
            timeout_secs = 30
            max_tokens = 1024
        "#
    }

    fn parse(toml_str: &str) -> AppConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_parse_sample_config() {
        let cfg = parse(sample_toml());
        assert_eq!(cfg.agent.name, "COURTSIDE-001");
        assert_eq!(cfg.gates.preset, "standard");
        assert!(cfg.gates.edge_threshold.is_none());
        assert_eq!(cfg.stake.policy, "fractional_kelly");
        assert!(cfg.sources.anthropic.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_gate_override_parses() {
        let mut toml_str = sample_toml().to_string();
        toml_str = toml_str.replace(
            "preset = \"standard\"",
            "preset = \"standard\"\nedge_threshold = 0.05",
        );
        let cfg = parse(&toml_str);
        assert_eq!(cfg.gates.edge_threshold, Some(0.05));
    }

    #[test]
    fn test_validate_rejects_bad_preset() {
        let toml_str = sample_toml().replace("\"standard\"", "\"reckless\"");
        let cfg = parse(&toml_str);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_weight() {
        let toml_str = sample_toml().replace("weight = 1.0", "weight = -1.0");
        let cfg = parse(&toml_str);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_cap() {
        let toml_str = sample_toml().replace("cap = 0.03", "cap = 0.5");
        let cfg = parse(&toml_str);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_model_params_default_when_absent() {
        let cfg = parse(sample_toml());
        assert_eq!(cfg.model.params().version, "courtside-lr-v1");
    }

    #[test]
    fn test_resolve_env_missing() {
        assert!(AppConfig::resolve_env("COURTSIDE_NO_SUCH_VAR_XYZ").is_err());
    }
}
