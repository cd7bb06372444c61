//! Shared types for the COURTSIDE engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that council, consensus,
//! gate, and engine modules can depend on them without circular
//! references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Which team a probability or price refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Home => write!(f, "HOME"),
            Side::Away => write!(f, "AWAY"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fact Pack
// ---------------------------------------------------------------------------

/// Game identity and scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInfo {
    pub game_id: String,
    pub tip_off: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
}

/// A moneyline price in either American or decimal format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoneylinePrice {
    American(i32),
    Decimal(f64),
}

impl MoneylinePrice {
    /// Raw implied probability, before vig removal.
    pub fn implied_prob(&self) -> Result<f64, CourtsideError> {
        match *self {
            MoneylinePrice::American(a) => {
                if a.abs() < 100 {
                    return Err(CourtsideError::ModelInput(format!(
                        "American price {a} outside valid range (|price| >= 100)"
                    )));
                }
                let v = a as f64;
                if v < 0.0 {
                    Ok(-v / (-v + 100.0))
                } else {
                    Ok(100.0 / (v + 100.0))
                }
            }
            MoneylinePrice::Decimal(d) => {
                if !d.is_finite() || d <= 1.0 {
                    return Err(CourtsideError::ModelInput(format!(
                        "Decimal price {d} must be finite and > 1.0"
                    )));
                }
                Ok(1.0 / d)
            }
        }
    }

    /// Net odds `b` (profit per unit staked) for Kelly sizing.
    pub fn net_odds(&self) -> Result<f64, CourtsideError> {
        let p = self.implied_prob()?;
        Ok((1.0 - p) / p)
    }
}

impl fmt::Display for MoneylinePrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoneylinePrice::American(a) if *a > 0 => write!(f, "+{a}"),
            MoneylinePrice::American(a) => write!(f, "{a}"),
            MoneylinePrice::Decimal(d) => write!(f, "{d:.2}"),
        }
    }
}

/// Sportsbook odds snapshot at decision time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub sportsbook: String,
    pub home_price: MoneylinePrice,
    pub away_price: MoneylinePrice,
}

impl OddsSnapshot {
    /// Age of the snapshot relative to `now`, in whole minutes.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.taken_at).num_minutes()
    }
}

/// Season-to-date and recent form metrics for one team.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TeamForm {
    pub net_rating: f64,
    pub pace: f64,
    /// Net rating over the last-5 window.
    pub last5_net_rating: f64,
}

/// Per-game form for both teams.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TeamFormPair {
    pub home: TeamForm,
    pub away: TeamForm,
}

/// Rest and travel context for one team.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RestContext {
    pub rest_days: u32,
    pub back_to_back: bool,
}

/// Schedule context for both teams.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduleContext {
    pub home: RestContext,
    pub away: RestContext,
}

/// Injury report status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjuryStatus {
    Out,
    Doubtful,
    Questionable,
    Probable,
}

impl InjuryStatus {
    /// Fraction of the expected minutes delta that is likely realised.
    pub fn availability_factor(&self) -> f64 {
        match self {
            InjuryStatus::Out => 1.0,
            InjuryStatus::Doubtful => 0.75,
            InjuryStatus::Questionable => 0.5,
            InjuryStatus::Probable => 0.25,
        }
    }
}

impl fmt::Display for InjuryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjuryStatus::Out => write!(f, "OUT"),
            InjuryStatus::Doubtful => write!(f, "DOUBTFUL"),
            InjuryStatus::Questionable => write!(f, "QUESTIONABLE"),
            InjuryStatus::Probable => write!(f, "PROBABLE"),
        }
    }
}

/// One line of the injury report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjuryEntry {
    pub player: String,
    pub side: Side,
    pub status: InjuryStatus,
    /// Expected change in minutes played (negative = minutes lost).
    pub expected_minutes_delta: f64,
    /// Player importance, 0.0 (deep bench) to 1.0 (franchise star).
    pub importance: f64,
    /// Confidence in the report itself, 0.0 to 1.0.
    pub source_confidence: f64,
}

impl InjuryEntry {
    /// Expected impact in weighted minutes lost (always >= 0).
    pub fn impact(&self) -> f64 {
        self.importance
            * self.source_confidence
            * self.expected_minutes_delta.abs()
            * self.status.availability_factor()
    }

    /// Whether this entry should raise the star-player hard-block flag.
    pub fn is_star_questionable(&self) -> bool {
        self.importance >= 0.8
            && matches!(
                self.status,
                InjuryStatus::Questionable | InjuryStatus::Doubtful
            )
    }
}

/// Market type covered by a Fact Pack. One market per pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    Moneyline,
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKind::Moneyline => write!(f, "moneyline"),
        }
    }
}

/// Immutable snapshot of all inputs for one game at decision time.
///
/// Constructed once per decision cycle by the data-acquisition layer;
/// every downstream component reasons only from these fields — nothing
/// in the core fetches additional live data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactPack {
    pub game: GameInfo,
    pub odds: OddsSnapshot,
    pub team_form: TeamFormPair,
    pub schedule: ScheduleContext,
    pub injuries: Vec<InjuryEntry>,
    pub market: MarketKind,
}

impl FactPack {
    /// Reject packs with physically implausible or non-finite values.
    ///
    /// Serde already rejects missing fields; this covers range checks
    /// that the schema alone cannot express.
    pub fn validate(&self) -> Result<(), CourtsideError> {
        let forms = [
            ("home", &self.team_form.home),
            ("away", &self.team_form.away),
        ];
        for (label, form) in forms {
            if !form.net_rating.is_finite() || form.net_rating.abs() > 60.0 {
                return Err(CourtsideError::ModelInput(format!(
                    "{label} net_rating {} out of plausible range",
                    form.net_rating
                )));
            }
            if !form.pace.is_finite() || form.pace <= 0.0 {
                return Err(CourtsideError::ModelInput(format!(
                    "{label} pace {} must be positive",
                    form.pace
                )));
            }
            if !form.last5_net_rating.is_finite() || form.last5_net_rating.abs() > 80.0 {
                return Err(CourtsideError::ModelInput(format!(
                    "{label} last5_net_rating {} out of plausible range",
                    form.last5_net_rating
                )));
            }
        }

        self.odds.home_price.implied_prob()?;
        self.odds.away_price.implied_prob()?;

        for entry in &self.injuries {
            if !(0.0..=1.0).contains(&entry.importance) {
                return Err(CourtsideError::ModelInput(format!(
                    "injury importance {} for {} outside [0,1]",
                    entry.importance, entry.player
                )));
            }
            if !(0.0..=1.0).contains(&entry.source_confidence) {
                return Err(CourtsideError::ModelInput(format!(
                    "injury source_confidence {} for {} outside [0,1]",
                    entry.source_confidence, entry.player
                )));
            }
            if !entry.expected_minutes_delta.is_finite()
                || entry.expected_minutes_delta.abs() > 48.0
            {
                return Err(CourtsideError::ModelInput(format!(
                    "expected_minutes_delta {} for {} out of range",
                    entry.expected_minutes_delta, entry.player
                )));
            }
        }

        Ok(())
    }

    /// Injury entries for one side of the matchup.
    pub fn injuries_for(&self, side: Side) -> impl Iterator<Item = &InjuryEntry> {
        self.injuries.iter().filter(move |e| e.side == side)
    }

    /// Helper to build a sample pack for tests.
    #[cfg(test)]
    pub fn sample() -> Self {
        FactPack {
            game: GameInfo {
                game_id: "2026-01-15-LAL-GSW".to_string(),
                tip_off: Utc::now() + chrono::Duration::hours(3),
                home_team: "Golden State Warriors".to_string(),
                away_team: "Los Angeles Lakers".to_string(),
            },
            odds: OddsSnapshot {
                taken_at: Utc::now() - chrono::Duration::minutes(10),
                sportsbook: "draftkings".to_string(),
                home_price: MoneylinePrice::American(-130),
                away_price: MoneylinePrice::American(110),
            },
            team_form: TeamFormPair {
                home: TeamForm {
                    net_rating: 4.2,
                    pace: 101.5,
                    last5_net_rating: 6.0,
                },
                away: TeamForm {
                    net_rating: 1.1,
                    pace: 99.8,
                    last5_net_rating: -2.5,
                },
            },
            schedule: ScheduleContext {
                home: RestContext {
                    rest_days: 2,
                    back_to_back: false,
                },
                away: RestContext {
                    rest_days: 0,
                    back_to_back: true,
                },
            },
            injuries: vec![InjuryEntry {
                player: "Bench Forward".to_string(),
                side: Side::Away,
                status: InjuryStatus::Out,
                expected_minutes_delta: -18.0,
                importance: 0.3,
                source_confidence: 0.9,
            }],
            market: MarketKind::Moneyline,
        }
    }
}

impl fmt::Display for FactPack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} @ {} ({} | home {} / away {} | {} injuries)",
            self.game.game_id,
            self.game.away_team,
            self.game.home_team,
            self.odds.sportsbook,
            self.odds.home_price,
            self.odds.away_price,
            self.injuries.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Risk flags
// ---------------------------------------------------------------------------

/// Well-known risk flag tags emitted by sources and the engine.
///
/// Flags are plain strings on the wire; these constants keep the core's
/// own usages consistent.
pub mod flags {
    pub const STAR_PLAYER_QUESTIONABLE: &str = "star_player_questionable";
    pub const TIMEOUT: &str = "timeout";
    pub const PARSE_FAILURE: &str = "parse_failure";
    pub const SCHEDULE_SPOT: &str = "schedule_spot";
    pub const LINE_MOVEMENT: &str = "line_movement";
    pub const BLOWOUT_RISK: &str = "blowout_risk";
}

// ---------------------------------------------------------------------------
// Vote Record
// ---------------------------------------------------------------------------

/// One source's normalized output for a cycle.
///
/// Exactly one record exists per configured source per cycle; invalid
/// records are excluded from aggregation but retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub source_id: String,
    /// Non-negative aggregation weight, configured externally.
    pub weight: f64,
    /// Probability that the HOME side wins. Orientation is normalized
    /// before the record is built.
    pub support_prob: f64,
    /// Injury uncertainty reported by the source, 0.0 to 1.0.
    pub uncertainty: f64,
    pub risk_flags: Vec<String>,
    pub reason_codes: Vec<String>,
    /// Free-text rationale. Never parsed, kept for audit only.
    pub rationale: String,
    pub valid: bool,
    pub invalid_reason: Option<String>,
}

impl VoteRecord {
    /// Build a valid, home-oriented vote.
    pub fn valid(
        source_id: impl Into<String>,
        weight: f64,
        support_prob: f64,
        uncertainty: f64,
        risk_flags: Vec<String>,
        reason_codes: Vec<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            weight,
            support_prob,
            uncertainty,
            risk_flags,
            reason_codes,
            rationale: rationale.into(),
            valid: true,
            invalid_reason: None,
        }
    }

    /// Build an invalid vote carrying the failure reason and flag.
    pub fn invalid(
        source_id: impl Into<String>,
        weight: f64,
        reason: impl Into<String>,
        flag: &str,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            weight,
            support_prob: 0.0,
            uncertainty: 0.0,
            risk_flags: vec![flag.to_string()],
            reason_codes: Vec::new(),
            rationale: String::new(),
            valid: false,
            invalid_reason: Some(reason.into()),
        }
    }

    /// Whether a flag is present on this record.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.risk_flags.iter().any(|f| f == flag)
    }
}

impl fmt::Display for VoteRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(
                f,
                "{}: P(home)={:.1}% unc={:.0}% w={:.1}",
                self.source_id,
                self.support_prob * 100.0,
                self.uncertainty * 100.0,
                self.weight,
            )
        } else {
            write!(
                f,
                "{}: INVALID ({})",
                self.source_id,
                self.invalid_reason.as_deref().unwrap_or("unknown"),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Consensus Result
// ---------------------------------------------------------------------------

/// Aggregated council output for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Weighted mean of valid home-oriented probabilities.
    pub consensus_prob: f64,
    /// Population standard deviation of valid probabilities.
    /// Defined as 0.0 with fewer than two valid votes.
    pub disagreement: f64,
    /// Weighted mean of reported uncertainties.
    pub mean_uncertainty: f64,
    /// Union of all sources' risk flags with occurrence counts.
    pub combined_risk_flags: BTreeMap<String, u32>,
    pub n_valid: usize,
    pub n_total: usize,
}

impl ConsensusResult {
    /// Whether a flag was raised by at least one source.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.combined_risk_flags.contains_key(flag)
    }

    /// How many sources raised a given flag.
    pub fn flag_count(&self, flag: &str) -> u32 {
        self.combined_risk_flags.get(flag).copied().unwrap_or(0)
    }

    /// Consensus strength: probability of the favored side, >= 0.5.
    pub fn strength(&self) -> f64 {
        self.consensus_prob.max(1.0 - self.consensus_prob)
    }
}

impl fmt::Display for ConsensusResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P(home)={:.1}% disagreement={:.3} uncertainty={:.2} ({}/{} valid)",
            self.consensus_prob * 100.0,
            self.disagreement,
            self.mean_uncertainty,
            self.n_valid,
            self.n_total,
        )
    }
}

// ---------------------------------------------------------------------------
// Decision Record
// ---------------------------------------------------------------------------

/// Terminal action for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    BetMax,
    BetSmall,
    /// Deliberate no-action on current, trusted data.
    NoBet,
    /// Not a bet decision at all — the cycle needs refreshed data or
    /// failed fatally. Distinct from NoBet.
    Pass,
}

impl Action {
    /// Whether this action places money at risk.
    pub fn is_bet(&self) -> bool {
        matches!(self, Action::BetMax | Action::BetSmall)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::BetMax => write!(f, "BET_MAX"),
            Action::BetSmall => write!(f, "BET_SMALL"),
            Action::NoBet => write!(f, "NO_BET"),
            Action::Pass => write!(f, "PASS"),
        }
    }
}

/// Pass/fail audit entry for a single gate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCheck {
    pub gate: String,
    pub passed: bool,
    /// The numeric value that drove the decision.
    pub value: f64,
    pub threshold: f64,
}

impl GateCheck {
    pub fn new(gate: impl Into<String>, passed: bool, value: f64, threshold: f64) -> Self {
        Self {
            gate: gate.into(),
            passed,
            value,
            threshold,
        }
    }
}

/// Final immutable output of one decision cycle.
///
/// Created once, never mutated. This is the system's sole externally
/// observable artifact; a persistence collaborator receives one per
/// cycle and owns durability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub game_id: String,
    pub created_at: DateTime<Utc>,
    pub action: Action,
    pub gates: Vec<GateCheck>,
    /// Fraction of bankroll to stake; 0.0 when not betting.
    pub stake_fraction: f64,
    pub final_edge: f64,
    pub consensus_prob: f64,
    pub disagreement: f64,
    /// All vote records for the cycle, valid and invalid, for audit.
    pub votes: Vec<VoteRecord>,
    /// Cause annotation for PASS records produced by fatal errors.
    pub audit_note: Option<String>,
}

impl DecisionRecord {
    /// Build a PASS record for a cycle that failed fatally before or
    /// during gating. The cause is always recorded — a fatal error is
    /// never an unannounced absence of output.
    pub fn pass(
        game_id: impl Into<String>,
        note: impl Into<String>,
        votes: Vec<VoteRecord>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id: game_id.into(),
            created_at: Utc::now(),
            action: Action::Pass,
            gates: Vec::new(),
            stake_fraction: 0.0,
            final_edge: 0.0,
            consensus_prob: 0.0,
            disagreement: 0.0,
            votes,
            audit_note: Some(note.into()),
        }
    }
}

impl fmt::Display for DecisionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | edge={:+.1}% consensus={:.1}% disagreement={:.3} stake={:.2}%",
            self.game_id,
            self.action,
            self.final_edge * 100.0,
            self.consensus_prob * 100.0,
            self.disagreement,
            self.stake_fraction * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for COURTSIDE.
#[derive(Debug, thiserror::Error)]
pub enum CourtsideError {
    #[error("Model input error: {0}")]
    ModelInput(String),

    #[error("Insufficient signal: all {n_total} sources invalid")]
    InsufficientSignal { n_total: usize },

    #[error("Invalid stake input: {0}")]
    InvalidStakeInput(String),

    #[error("Source error ({source_id}): {message}")]
    Source { source_id: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
