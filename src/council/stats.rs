//! The statistical model as a council member.
//!
//! Wraps `StatsEdgeModel` behind the `SignalSource` trait so the
//! aggregator treats it exactly like any LLM voter: same wire shape,
//! same weight mechanics, same timeout bound (trivially met — the
//! model is pure arithmetic).

use async_trait::async_trait;
use std::time::Duration;

use super::wire::SourceReply;
use super::SignalSource;
use crate::model::StatsEdgeModel;
use crate::types::{flags, CourtsideError, FactPack, Side};

pub const STATS_SOURCE_ID: &str = "stats";

pub struct StatsSource {
    model: StatsEdgeModel,
    weight: f64,
}

impl StatsSource {
    pub fn new(model: StatsEdgeModel, weight: f64) -> Self {
        Self { model, weight }
    }
}

#[async_trait]
impl SignalSource for StatsSource {
    fn source_id(&self) -> &str {
        STATS_SOURCE_ID
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn solicit(&self, pack: &FactPack) -> Result<SourceReply, CourtsideError> {
        let prediction = self.model.predict(pack)?;

        // Uncertainty from the injury report itself: scaled aggregate
        // impact across both rosters, saturating at 1.0.
        let total_impact: f64 = pack.injuries.iter().map(|e| e.impact()).sum();
        let injury_uncertainty = (total_impact / 60.0).min(1.0);

        let mut risk_flags = Vec::new();
        if pack.injuries.iter().any(|e| e.is_star_questionable()) {
            risk_flags.push(flags::STAR_PLAYER_QUESTIONABLE.to_string());
        }
        let away_b2b = pack.schedule.away.back_to_back;
        let home_b2b = pack.schedule.home.back_to_back;
        if away_b2b != home_b2b {
            risk_flags.push(flags::SCHEDULE_SPOT.to_string());
        }

        let mut reason_codes = Vec::new();
        let form_gap =
            pack.team_form.home.net_rating - pack.team_form.away.net_rating;
        if form_gap.abs() >= 3.0 {
            reason_codes.push("net_rating_gap".to_string());
        }
        if pack.schedule.home.rest_days != pack.schedule.away.rest_days {
            reason_codes.push("rest_advantage".to_string());
        }

        let favored = prediction.favored();
        let support_prob = match favored {
            Side::Home => prediction.p_home,
            Side::Away => prediction.p_away,
        };

        Ok(SourceReply {
            favored,
            support_prob,
            injury_uncertainty,
            risk_flags,
            reason_codes,
            rationale: format!(
                "model {}: P(home)={:.1}%, implied {:.1}%, edge {:+.1}%",
                self.model.params().version,
                prediction.p_home * 100.0,
                prediction.implied_home * 100.0,
                prediction.edge * 100.0,
            ),
        })
    }
}
