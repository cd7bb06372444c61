//! Decision engine.
//!
//! Orchestrates one full cycle: validate the Fact Pack, run the stats
//! model, convene the council, aggregate, gate, size the stake, and
//! emit exactly one immutable `DecisionRecord`. The edge handed to the
//! gate is the stats model's edge against the vig-free market price;
//! the council only shapes consensus strength, disagreement, and
//! flags. A fatal error anywhere in the cycle
//! still produces a record — a PASS carrying the cause — so there is
//! never an unexplained gap in the decision log.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::consensus::ConsensusAggregator;
use crate::council::Council;
use crate::gate::DecisionGate;
use crate::model::StatsEdgeModel;
use crate::stake::StakeSizer;
use crate::types::{Action, DecisionRecord, FactPack, Side};

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Bankroll state the engine sizes against.
#[async_trait]
pub trait BankrollTracker: Send + Sync {
    /// Current bankroll.
    async fn bankroll(&self) -> f64;

    /// Total amount already committed today.
    async fn exposed_today(&self) -> f64;

    /// Record a newly committed stake.
    async fn record_stake(&self, amount: f64);
}

/// Receives every decision record. Owns durability.
#[async_trait]
pub trait DecisionSink: Send + Sync {
    async fn record(&self, record: &DecisionRecord) -> Result<()>;
}

/// Simple in-process bankroll tracker.
pub struct InMemoryBankroll {
    bankroll: f64,
    exposed: Mutex<f64>,
}

impl InMemoryBankroll {
    pub fn new(bankroll: f64) -> Self {
        Self {
            bankroll,
            exposed: Mutex::new(0.0),
        }
    }
}

#[async_trait]
impl BankrollTracker for InMemoryBankroll {
    async fn bankroll(&self) -> f64 {
        self.bankroll
    }

    async fn exposed_today(&self) -> f64 {
        *self.exposed.lock().unwrap()
    }

    async fn record_stake(&self, amount: f64) {
        *self.exposed.lock().unwrap() += amount;
    }
}

/// Sink that logs each record and keeps it in memory.
pub struct LoggingSink {
    records: Mutex<Vec<DecisionRecord>>,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<DecisionRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl Default for LoggingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionSink for LoggingSink {
    async fn record(&self, record: &DecisionRecord) -> Result<()> {
        info!(decision = %record, "Decision recorded");
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct DecisionEngine {
    council: Council,
    model: StatsEdgeModel,
    gate: DecisionGate,
    sizer: StakeSizer,
    bankroll: Arc<dyn BankrollTracker>,
    sink: Arc<dyn DecisionSink>,
    /// Fraction of bankroll allowed across one day's stakes.
    max_daily_exposure_pct: f64,
}

impl DecisionEngine {
    pub fn new(
        council: Council,
        model: StatsEdgeModel,
        gate: DecisionGate,
        sizer: StakeSizer,
        bankroll: Arc<dyn BankrollTracker>,
        sink: Arc<dyn DecisionSink>,
        max_daily_exposure_pct: f64,
    ) -> Self {
        Self {
            council,
            model,
            gate,
            sizer,
            bankroll,
            sink,
            max_daily_exposure_pct,
        }
    }

    /// Run one decision cycle end to end.
    ///
    /// Always returns a record. Fatal conditions (invalid pack, all
    /// sources dead, pricing errors) produce a PASS with the cause in
    /// `audit_note`; only sink failures propagate as errors.
    pub async fn run_cycle(&self, pack: &FactPack) -> Result<DecisionRecord> {
        let record = self.decide(pack).await;
        self.sink
            .record(&record)
            .await
            .context("Failed to persist decision record")?;
        Ok(record)
    }

    async fn decide(&self, pack: &FactPack) -> DecisionRecord {
        let game_id = pack.game.game_id.clone();

        if let Err(e) = pack.validate() {
            warn!(game_id = %game_id, error = %e, "Fact pack rejected");
            return DecisionRecord::pass(game_id, format!("fact pack rejected: {e}"), Vec::new());
        }

        let prediction = match self.model.predict(pack) {
            Ok(p) => p,
            Err(e) => {
                return DecisionRecord::pass(
                    game_id,
                    format!("model prediction failed: {e}"),
                    Vec::new(),
                )
            }
        };

        let votes = self.council.convene(pack).await;

        let consensus = match ConsensusAggregator::aggregate(&votes) {
            Ok(c) => c,
            Err(e) => {
                return DecisionRecord::pass(game_id, format!("aggregation failed: {e}"), votes)
            }
        };

        let edge = prediction.edge;

        let verdict = self.gate.evaluate(pack, &consensus, edge, Utc::now());

        let (action, stake_fraction, audit_note) =
            match self.size_action(pack, verdict.action, &consensus, edge).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    return DecisionRecord::pass(game_id, format!("sizing failed: {e}"), votes)
                }
            };

        if action.is_bet() {
            self.bankroll
                .record_stake(stake_fraction * self.bankroll.bankroll().await)
                .await;
        }

        DecisionRecord {
            id: Uuid::new_v4(),
            game_id,
            created_at: Utc::now(),
            action,
            gates: verdict.checks,
            stake_fraction,
            final_edge: edge,
            consensus_prob: consensus.consensus_prob,
            disagreement: consensus.disagreement,
            votes,
            audit_note,
        }
    }

    /// Turn the gate action into a stake fraction, honoring the daily
    /// exposure ceiling. A bet with no headroom left becomes NO_BET.
    async fn size_action(
        &self,
        pack: &FactPack,
        action: Action,
        consensus: &crate::types::ConsensusResult,
        edge: f64,
    ) -> Result<(Action, f64, Option<String>), crate::types::CourtsideError> {
        if !action.is_bet() {
            return Ok((action, 0.0, None));
        }

        let side = if edge >= 0.0 { Side::Home } else { Side::Away };
        let p_win = match side {
            Side::Home => consensus.consensus_prob,
            Side::Away => 1.0 - consensus.consensus_prob,
        };
        let price = match side {
            Side::Home => pack.odds.home_price,
            Side::Away => pack.odds.away_price,
        };

        let bankroll = self.bankroll.bankroll().await;
        let fraction = self
            .sizer
            .size(action, p_win, price.net_odds()?, bankroll)?;

        let exposed = self.bankroll.exposed_today().await;
        let headroom = (self.max_daily_exposure_pct * bankroll - exposed).max(0.0);
        let stake = fraction * bankroll;

        if headroom <= 0.0 {
            warn!(exposed, "Daily exposure ceiling reached, blocking bet");
            return Ok((
                Action::NoBet,
                0.0,
                Some("daily exposure ceiling reached".to_string()),
            ));
        }

        if stake > headroom {
            let clamped = headroom / bankroll;
            info!(
                requested = format!("{:.3}%", fraction * 100.0),
                clamped = format!("{:.3}%", clamped * 100.0),
                "Stake clamped to daily exposure headroom"
            );
            return Ok((
                action,
                clamped,
                Some("stake clamped to daily exposure headroom".to_string()),
            ));
        }

        Ok((action, fraction, None))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
