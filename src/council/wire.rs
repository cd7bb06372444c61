//! Council wire format.
//!
//! Every signal source, statistical or LLM, answers in the same JSON
//! shape. This module owns extraction of that JSON from raw model
//! output (fenced or bare), range validation, and normalization into a
//! home-oriented `VoteRecord`.

use serde::{Deserialize, Serialize};

use crate::types::{CourtsideError, Side, VoteRecord};

/// One source's raw answer, before orientation normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReply {
    /// Which side the probability refers to.
    pub favored: Side,
    /// Probability that `favored` wins, 0.0 to 1.0.
    pub support_prob: f64,
    /// How much injury ambiguity clouds the read, 0.0 to 1.0.
    pub injury_uncertainty: f64,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    #[serde(default)]
    pub reason_codes: Vec<String>,
    #[serde(default)]
    pub rationale: String,
}

impl SourceReply {
    /// Range checks on the numeric fields.
    pub fn validate(&self) -> Result<(), CourtsideError> {
        if !self.support_prob.is_finite() || !(0.0..=1.0).contains(&self.support_prob) {
            return Err(CourtsideError::ModelInput(format!(
                "support_prob {} outside [0, 1]",
                self.support_prob
            )));
        }
        if !self.injury_uncertainty.is_finite()
            || !(0.0..=1.0).contains(&self.injury_uncertainty)
        {
            return Err(CourtsideError::ModelInput(format!(
                "injury_uncertainty {} outside [0, 1]",
                self.injury_uncertainty
            )));
        }
        Ok(())
    }

    /// The reply's probability expressed for the HOME side.
    pub fn home_prob(&self) -> f64 {
        match self.favored {
            Side::Home => self.support_prob,
            Side::Away => 1.0 - self.support_prob,
        }
    }

    /// Normalize into a valid, home-oriented vote record.
    pub fn into_vote(self, source_id: &str, weight: f64) -> VoteRecord {
        let home_prob = self.home_prob();
        VoteRecord::valid(
            source_id,
            weight,
            home_prob,
            self.injury_uncertainty,
            self.risk_flags,
            self.reason_codes,
            self.rationale,
        )
    }
}

/// Extract a `SourceReply` from raw model output.
///
/// Models wrap JSON in markdown fences or pad it with prose more often
/// than not. Strategy: strip fences if present, then slice from the
/// first `{` to the last `}` and parse that.
pub fn extract_reply(text: &str) -> Result<SourceReply, CourtsideError> {
    let candidate = strip_fences(text);
    let start = candidate.find('{');
    let end = candidate.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &candidate[s..=e],
        _ => {
            return Err(CourtsideError::ModelInput(
                "no JSON object found in source output".to_string(),
            ))
        }
    };

    let reply: SourceReply = serde_json::from_str(json)
        .map_err(|e| CourtsideError::ModelInput(format!("malformed source JSON: {e}")))?;
    reply.validate()?;
    Ok(reply)
}

/// Remove a leading/trailing markdown code fence if present.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    else {
        return trimmed;
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
