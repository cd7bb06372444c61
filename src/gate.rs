//! Decision gates.
//!
//! Turns a consensus result plus model edge into one of four actions.
//! Gating is total: any well-formed input produces exactly one action,
//! and every check is recorded pass or fail for the audit trail.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::GatesConfig;
use crate::types::{flags, Action, ConsensusResult, CourtsideError, FactPack, GateCheck};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Fully-resolved gate thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatePolicy {
    /// Minimum absolute edge to consider betting at all.
    pub edge_threshold: f64,
    /// Disagreement above this blocks betting.
    pub disagreement_threshold: f64,
    /// Disagreement above this blocks before any other gate runs.
    pub disagreement_hard_ceiling: f64,
    /// Mean uncertainty above this blocks betting.
    pub uncertainty_threshold: f64,
    /// Odds older than this make the cycle a PASS.
    pub max_odds_age_minutes: i64,
    /// With a star questionable, mean uncertainty above this floor is a
    /// hard block.
    pub star_uncertainty_floor: f64,
    /// BET_MAX requires at least this much absolute edge...
    pub bet_max_edge: f64,
    /// ...and at least this much consensus strength.
    pub bet_max_consensus: f64,
}

impl GatePolicy {
    /// The default balanced preset.
    pub fn standard() -> Self {
        Self {
            edge_threshold: 0.03,
            disagreement_threshold: 0.08,
            disagreement_hard_ceiling: 0.12,
            uncertainty_threshold: 0.25,
            max_odds_age_minutes: 60,
            star_uncertainty_floor: 0.15,
            bet_max_edge: 0.05,
            bet_max_consensus: 0.60,
        }
    }

    /// Tighter edge requirements, otherwise standard.
    pub fn conservative() -> Self {
        Self {
            edge_threshold: 0.04,
            bet_max_edge: 0.04,
            ..Self::standard()
        }
    }

    /// Looser edge requirement but a tighter disagreement screen.
    pub fn aggressive() -> Self {
        Self {
            edge_threshold: 0.02,
            disagreement_threshold: 0.06,
            ..Self::standard()
        }
    }

    /// Resolve a preset name.
    pub fn preset(name: &str) -> Result<Self, CourtsideError> {
        match name {
            "standard" => Ok(Self::standard()),
            "conservative" => Ok(Self::conservative()),
            "aggressive" => Ok(Self::aggressive()),
            other => Err(CourtsideError::Config(format!(
                "unknown gate preset: {other}"
            ))),
        }
    }

    /// Build a policy from configuration: preset plus field overrides.
    pub fn from_config(cfg: &GatesConfig) -> Result<Self, CourtsideError> {
        let mut policy = Self::preset(&cfg.preset)?;
        if let Some(v) = cfg.edge_threshold {
            policy.edge_threshold = v;
        }
        if let Some(v) = cfg.disagreement_threshold {
            policy.disagreement_threshold = v;
        }
        if let Some(v) = cfg.disagreement_hard_ceiling {
            policy.disagreement_hard_ceiling = v;
        }
        if let Some(v) = cfg.uncertainty_threshold {
            policy.uncertainty_threshold = v;
        }
        if let Some(v) = cfg.max_odds_age_minutes {
            policy.max_odds_age_minutes = v;
        }
        if let Some(v) = cfg.star_uncertainty_floor {
            policy.star_uncertainty_floor = v;
        }
        if let Some(v) = cfg.bet_max_edge {
            policy.bet_max_edge = v;
        }
        if let Some(v) = cfg.bet_max_consensus {
            policy.bet_max_consensus = v;
        }
        Ok(policy)
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Gate outcome: the action plus the full audit trail of checks.
#[derive(Debug, Clone, PartialEq)]
pub struct GateVerdict {
    pub action: Action,
    pub checks: Vec<GateCheck>,
}

impl GateVerdict {
    fn new(action: Action, checks: Vec<GateCheck>) -> Self {
        Self { action, checks }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Applies the gate policy to one cycle's evidence.
pub struct DecisionGate {
    policy: GatePolicy,
}

impl DecisionGate {
    pub fn new(policy: GatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Evaluate all gates. Checks run in a fixed order and every one
    /// executed is recorded; evaluation stops at the first terminal
    /// outcome.
    ///
    /// Order: staleness (PASS), hard blocks (NO_BET), then the edge,
    /// uncertainty, and disagreement gates (each NO_BET on failure),
    /// then the bet sizing band.
    pub fn evaluate(
        &self,
        pack: &FactPack,
        consensus: &ConsensusResult,
        edge: f64,
        now: DateTime<Utc>,
    ) -> GateVerdict {
        let p = &self.policy;
        let mut checks = Vec::new();

        // Staleness first: stale odds mean the question itself is
        // outdated, so the outcome is PASS rather than NO_BET.
        let age = pack.odds.age_minutes(now);
        let fresh = age <= p.max_odds_age_minutes;
        checks.push(GateCheck::new(
            "odds_freshness",
            fresh,
            age as f64,
            p.max_odds_age_minutes as f64,
        ));
        if !fresh {
            info!(game_id = %pack.game.game_id, age_minutes = age, "Stale odds, passing");
            return GateVerdict::new(Action::Pass, checks);
        }

        // Hard block: extreme disagreement means the council does not
        // agree on what game is being played.
        let under_ceiling = consensus.disagreement <= p.disagreement_hard_ceiling;
        checks.push(GateCheck::new(
            "disagreement_ceiling",
            under_ceiling,
            consensus.disagreement,
            p.disagreement_hard_ceiling,
        ));
        if !under_ceiling {
            return GateVerdict::new(Action::NoBet, checks);
        }

        // Hard block: a questionable star plus elevated aggregate
        // uncertainty is exactly the spot where models are blind.
        let star_flagged = consensus.has_flag(flags::STAR_PLAYER_QUESTIONABLE)
            || pack.injuries.iter().any(|e| e.is_star_questionable());
        let star_ok = !(star_flagged && consensus.mean_uncertainty > p.star_uncertainty_floor);
        checks.push(GateCheck::new(
            "star_questionable",
            star_ok,
            consensus.mean_uncertainty,
            p.star_uncertainty_floor,
        ));
        if !star_ok {
            return GateVerdict::new(Action::NoBet, checks);
        }

        // Gate 1: edge.
        let edge_ok = edge.abs() >= p.edge_threshold;
        checks.push(GateCheck::new(
            "edge",
            edge_ok,
            edge.abs(),
            p.edge_threshold,
        ));
        if !edge_ok {
            return GateVerdict::new(Action::NoBet, checks);
        }

        // Gate 2: uncertainty.
        let uncertainty_ok = consensus.mean_uncertainty <= p.uncertainty_threshold;
        checks.push(GateCheck::new(
            "uncertainty",
            uncertainty_ok,
            consensus.mean_uncertainty,
            p.uncertainty_threshold,
        ));
        if !uncertainty_ok {
            return GateVerdict::new(Action::NoBet, checks);
        }

        // Gate 3: disagreement. A split council means the evidence is
        // conflicting, not merely weak, so the bet is blocked rather
        // than shrunk.
        let agreement_ok = consensus.disagreement <= p.disagreement_threshold;
        checks.push(GateCheck::new(
            "disagreement",
            agreement_ok,
            consensus.disagreement,
            p.disagreement_threshold,
        ));
        if !agreement_ok {
            return GateVerdict::new(Action::NoBet, checks);
        }

        // All gates clear: size by conviction.
        let max_band =
            edge.abs() >= p.bet_max_edge && consensus.strength() >= p.bet_max_consensus;
        checks.push(GateCheck::new(
            "bet_max_band",
            max_band,
            edge.abs(),
            p.bet_max_edge,
        ));
        let action = if max_band {
            Action::BetMax
        } else {
            Action::BetSmall
        };

        GateVerdict::new(action, checks)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn consensus(prob: f64, disagreement: f64, uncertainty: f64) -> ConsensusResult {
        ConsensusResult {
            consensus_prob: prob,
            disagreement,
            mean_uncertainty: uncertainty,
            combined_risk_flags: BTreeMap::new(),
            n_valid: 3,
            n_total: 4,
        }
    }

    fn gate() -> DecisionGate {
        DecisionGate::new(GatePolicy::standard())
    }

    fn fresh_pack() -> FactPack {
        let mut pack = FactPack::sample();
        pack.injuries.clear(); // no star ambiguity unless a test adds it
        pack.odds.taken_at = Utc::now() - chrono::Duration::minutes(5);
        pack
    }

    #[test]
    fn test_presets() {
        assert_eq!(GatePolicy::standard().edge_threshold, 0.03);
        assert_eq!(GatePolicy::conservative().edge_threshold, 0.04);
        assert_eq!(GatePolicy::aggressive().edge_threshold, 0.02);
        assert_eq!(GatePolicy::aggressive().disagreement_threshold, 0.06);
        assert!(GatePolicy::preset("reckless").is_err());

        // Every preset keeps a reachable BET_MAX band: clearing the
        // edge gate by a point must be able to clear the band too.
        for policy in [
            GatePolicy::standard(),
            GatePolicy::conservative(),
            GatePolicy::aggressive(),
        ] {
            assert!(policy.bet_max_edge >= policy.edge_threshold);
        }
    }

    #[test]
    fn test_config_overrides() {
        let cfg = GatesConfig {
            preset: "standard".to_string(),
            edge_threshold: Some(0.045),
            disagreement_threshold: None,
            disagreement_hard_ceiling: None,
            uncertainty_threshold: None,
            max_odds_age_minutes: Some(30),
            star_uncertainty_floor: None,
            bet_max_edge: None,
            bet_max_consensus: None,
        };
        let policy = GatePolicy::from_config(&cfg).unwrap();
        assert_eq!(policy.edge_threshold, 0.045);
        assert_eq!(policy.max_odds_age_minutes, 30);
        assert_eq!(
            policy.disagreement_threshold,
            GatePolicy::standard().disagreement_threshold
        );
    }

    #[test]
    fn test_strong_agreement_large_edge_is_bet_max() {
        // edge 6%, disagreement 0.02, strength 0.62
        let v = gate().evaluate(&fresh_pack(), &consensus(0.62, 0.02, 0.10), 0.06, Utc::now());
        assert_eq!(v.action, Action::BetMax);
        assert!(v.checks.iter().all(|c| c.passed));
    }

    #[test]
    fn test_moderate_edge_is_bet_small() {
        // edge passes the 3% gate but not the 5% max band
        let v = gate().evaluate(&fresh_pack(), &consensus(0.58, 0.02, 0.10), 0.035, Utc::now());
        assert_eq!(v.action, Action::BetSmall);
    }

    #[test]
    fn test_edge_exactly_at_threshold_passes() {
        // Boundary is inclusive.
        let v = gate().evaluate(&fresh_pack(), &consensus(0.58, 0.02, 0.10), 0.03, Utc::now());
        assert!(v.action.is_bet());
    }

    #[test]
    fn test_edge_below_threshold_is_no_bet() {
        let v = gate().evaluate(&fresh_pack(), &consensus(0.55, 0.01, 0.05), 0.029, Utc::now());
        assert_eq!(v.action, Action::NoBet);
        let edge_check = v.checks.iter().find(|c| c.gate == "edge").unwrap();
        assert!(!edge_check.passed);
    }

    #[test]
    fn test_negative_edge_counts_by_magnitude() {
        // Away-side value: |edge| drives the gate
        let v = gate().evaluate(&fresh_pack(), &consensus(0.38, 0.02, 0.10), -0.06, Utc::now());
        assert_eq!(v.action, Action::BetMax); // strength 0.62, |edge| 0.06
    }

    #[test]
    fn test_disagreement_above_threshold_blocks() {
        // Large edge and low uncertainty cannot buy back a split
        // council: disagreement 0.10 > 0.08 is NO_BET, not a smaller bet.
        let v = gate().evaluate(&fresh_pack(), &consensus(0.65, 0.10, 0.10), 0.07, Utc::now());
        assert_eq!(v.action, Action::NoBet);
        let check = v.checks.iter().find(|c| c.gate == "disagreement").unwrap();
        assert!(!check.passed);
    }

    #[test]
    fn test_disagreement_at_ceiling_fails_threshold_gate() {
        // 0.12 clears the early ceiling check but not the 0.08 gate.
        let v = gate().evaluate(&fresh_pack(), &consensus(0.65, 0.12, 0.10), 0.07, Utc::now());
        assert_eq!(v.action, Action::NoBet);
        let ceiling = v
            .checks
            .iter()
            .find(|c| c.gate == "disagreement_ceiling")
            .unwrap();
        assert!(ceiling.passed);
        let threshold = v.checks.iter().find(|c| c.gate == "disagreement").unwrap();
        assert!(!threshold.passed);
    }

    #[test]
    fn test_disagreement_above_hard_ceiling_blocks() {
        let v = gate().evaluate(&fresh_pack(), &consensus(0.65, 0.13, 0.10), 0.08, Utc::now());
        assert_eq!(v.action, Action::NoBet);
        let check = v
            .checks
            .iter()
            .find(|c| c.gate == "disagreement_ceiling")
            .unwrap();
        assert!(!check.passed);
    }

    #[test]
    fn test_high_uncertainty_blocks() {
        let v = gate().evaluate(&fresh_pack(), &consensus(0.62, 0.02, 0.30), 0.06, Utc::now());
        assert_eq!(v.action, Action::NoBet);
    }

    #[test]
    fn test_stale_odds_is_pass_not_no_bet() {
        let mut pack = fresh_pack();
        pack.odds.taken_at = Utc::now() - chrono::Duration::minutes(90);
        let v = gate().evaluate(&pack, &consensus(0.62, 0.02, 0.10), 0.06, Utc::now());
        assert_eq!(v.action, Action::Pass);
        assert_eq!(v.checks.len(), 1); // nothing else evaluated
    }

    #[test]
    fn test_odds_exactly_at_age_limit_are_fresh() {
        let mut pack = fresh_pack();
        pack.odds.taken_at = Utc::now() - chrono::Duration::minutes(60);
        let v = gate().evaluate(&pack, &consensus(0.62, 0.02, 0.10), 0.06, Utc::now());
        assert_ne!(v.action, Action::Pass);
    }

    #[test]
    fn test_star_questionable_with_high_uncertainty_blocks() {
        let mut c = consensus(0.62, 0.02, 0.20); // above 0.15 floor
        c.combined_risk_flags
            .insert(flags::STAR_PLAYER_QUESTIONABLE.to_string(), 2);
        let v = gate().evaluate(&fresh_pack(), &c, 0.06, Utc::now());
        assert_eq!(v.action, Action::NoBet);
    }

    #[test]
    fn test_star_questionable_with_low_uncertainty_allows_bet() {
        let mut c = consensus(0.62, 0.02, 0.10); // below 0.15 floor
        c.combined_risk_flags
            .insert(flags::STAR_PLAYER_QUESTIONABLE.to_string(), 1);
        let v = gate().evaluate(&fresh_pack(), &c, 0.06, Utc::now());
        assert_eq!(v.action, Action::BetMax);
    }

    #[test]
    fn test_star_flag_from_fact_pack_alone() {
        use crate::types::{InjuryEntry, InjuryStatus, Side};
        let mut pack = fresh_pack();
        pack.injuries.push(InjuryEntry {
            player: "Franchise Star".into(),
            side: Side::Home,
            status: InjuryStatus::Questionable,
            expected_minutes_delta: -36.0,
            importance: 0.95,
            source_confidence: 0.9,
        });
        // Council missed it, but the pack shows it.
        let v = gate().evaluate(&pack, &consensus(0.62, 0.02, 0.20), 0.06, Utc::now());
        assert_eq!(v.action, Action::NoBet);
    }

    #[test]
    fn test_bet_max_needs_consensus_strength_too() {
        // Edge is big enough but strength 0.58 < 0.60
        let v = gate().evaluate(&fresh_pack(), &consensus(0.58, 0.02, 0.10), 0.06, Utc::now());
        assert_eq!(v.action, Action::BetSmall);
    }

    #[test]
    fn test_conservative_bet_max_reachable_from_real_votes() {
        // Three sources clustered around 0.61 agree tightly; with a
        // 4.5% edge the conservative preset still reaches BET_MAX.
        use crate::consensus::ConsensusAggregator;
        use crate::types::VoteRecord;

        let votes = vec![
            VoteRecord::valid("a", 1.0, 0.61, 0.10, vec![], vec![], "r"),
            VoteRecord::valid("b", 1.0, 0.63, 0.10, vec![], vec![], "r"),
            VoteRecord::valid("c", 1.0, 0.60, 0.10, vec![], vec![], "r"),
        ];
        let c = ConsensusAggregator::aggregate(&votes).unwrap();
        assert!(c.strength() > 0.60);
        assert!(c.disagreement < 0.08);

        let g = DecisionGate::new(GatePolicy::conservative());
        let v = g.evaluate(&fresh_pack(), &c, 0.045, Utc::now());
        assert_eq!(v.action, Action::BetMax);
    }

    #[test]
    fn test_totality_grid() {
        // Every combination of inputs yields exactly one action.
        let pack = fresh_pack();
        let now = Utc::now();
        let g = gate();
        for &edge in &[-0.08, -0.03, 0.0, 0.029, 0.03, 0.05, 0.09] {
            for &dis in &[0.0, 0.08, 0.09, 0.12, 0.13] {
                for &unc in &[0.0, 0.25, 0.26] {
                    for &prob in &[0.40, 0.55, 0.65] {
                        let v = g.evaluate(&pack, &consensus(prob, dis, unc), edge, now);
                        assert!(matches!(
                            v.action,
                            Action::BetMax | Action::BetSmall | Action::NoBet | Action::Pass
                        ));
                        assert!(!v.checks.is_empty());
                    }
                }
            }
        }
    }

    #[test]
    fn test_audit_trail_records_failed_check_last() {
        let v = gate().evaluate(&fresh_pack(), &consensus(0.55, 0.01, 0.05), 0.01, Utc::now());
        let last = v.checks.last().unwrap();
        assert_eq!(last.gate, "edge");
        assert!(!last.passed);
        // Checks before the failure all passed.
        for check in &v.checks[..v.checks.len() - 1] {
            assert!(check.passed);
        }
    }
}
