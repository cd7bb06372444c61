//! Consensus aggregation over council votes.
//!
//! Collapses the cycle's vote records into a single weighted consensus
//! probability with a disagreement measure and the union of risk flags.
//! Invalid votes are excluded from the numbers but their flags still
//! surface in the combined set.

use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::types::{ConsensusResult, CourtsideError, VoteRecord};

/// Weighted-mean aggregator.
///
/// Pure and order-invariant: votes are sorted by `source_id` before any
/// float accumulation, so the same set of votes always produces the
/// same bits regardless of arrival order.
pub struct ConsensusAggregator;

impl ConsensusAggregator {
    /// Aggregate one cycle's votes.
    ///
    /// Fails with `InsufficientSignal` when no valid vote carries
    /// positive weight — a consensus built from nothing is worse than
    /// no consensus.
    pub fn aggregate(votes: &[VoteRecord]) -> Result<ConsensusResult, CourtsideError> {
        let n_total = votes.len();

        let mut sorted: Vec<&VoteRecord> = votes.iter().collect();
        sorted.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        let valid: Vec<&VoteRecord> = sorted.iter().copied().filter(|v| v.valid).collect();
        let n_valid = valid.len();
        let total_weight: f64 = valid.iter().map(|v| v.weight).sum();

        if total_weight <= 0.0 {
            warn!(n_total, "No valid weighted votes to aggregate");
            return Err(CourtsideError::InsufficientSignal { n_total });
        }

        let consensus_prob: f64 = valid
            .iter()
            .map(|v| v.weight * v.support_prob)
            .sum::<f64>()
            / total_weight;

        let mean_uncertainty: f64 = valid
            .iter()
            .map(|v| v.weight * v.uncertainty)
            .sum::<f64>()
            / total_weight;

        // Population (not sample) standard deviation, unweighted, over
        // valid probabilities. Defined as 0.0 with fewer than two votes.
        let disagreement = if n_valid < 2 {
            0.0
        } else {
            let mean: f64 =
                valid.iter().map(|v| v.support_prob).sum::<f64>() / n_valid as f64;
            let variance: f64 = valid
                .iter()
                .map(|v| (v.support_prob - mean).powi(2))
                .sum::<f64>()
                / n_valid as f64;
            variance.sqrt()
        };

        // Flags from every record, invalid ones included: a timeout is
        // itself a risk signal.
        let mut combined_risk_flags: BTreeMap<String, u32> = BTreeMap::new();
        for vote in &sorted {
            for flag in &vote.risk_flags {
                *combined_risk_flags.entry(flag.clone()).or_insert(0) += 1;
            }
        }

        let result = ConsensusResult {
            consensus_prob,
            disagreement,
            mean_uncertainty,
            combined_risk_flags,
            n_valid,
            n_total,
        };

        info!(
            consensus = format!("{:.1}%", result.consensus_prob * 100.0),
            disagreement = format!("{:.3}", result.disagreement),
            valid = format!("{}/{}", n_valid, n_total),
            "Consensus aggregated"
        );

        Ok(result)
    }
}
