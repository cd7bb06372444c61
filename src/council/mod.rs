//! The signal council.
//!
//! Defines the `SignalSource` trait and the `Council` that fans a Fact
//! Pack out to every configured source concurrently, bounds each by its
//! own timeout, and returns exactly one vote record per source.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod stats;
pub mod wire;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::types::{flags, CourtsideError, FactPack, VoteRecord};
use wire::SourceReply;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over anything that can vote on a game.
///
/// Implementors receive the Fact Pack and nothing else: no source may
/// fetch additional live data during a cycle.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Stable identifier, unique within a council.
    fn source_id(&self) -> &str;

    /// Aggregation weight, non-negative.
    fn weight(&self) -> f64;

    /// Per-solicitation deadline.
    fn timeout(&self) -> Duration;

    /// Produce an opinion on the game.
    async fn solicit(&self, pack: &FactPack) -> Result<SourceReply, CourtsideError>;
}

// ---------------------------------------------------------------------------
// Council
// ---------------------------------------------------------------------------

/// Fans one Fact Pack out to all sources and collects votes.
pub struct Council {
    sources: Vec<Arc<dyn SignalSource>>,
}

impl Council {
    pub fn new(sources: Vec<Arc<dyn SignalSource>>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Solicit every source concurrently.
    ///
    /// A slow or failed source never takes the cycle down: timeouts and
    /// errors become invalid votes carrying the corresponding flag. The
    /// returned records are sorted by source id so downstream float
    /// accumulation is independent of completion order.
    pub async fn convene(&self, pack: &FactPack) -> Vec<VoteRecord> {
        info!(sources = self.sources.len(), game_id = %pack.game.game_id, "Convening council");

        let solicitations = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            async move {
                let id = source.source_id().to_string();
                let weight = source.weight();
                let deadline = source.timeout();

                match tokio::time::timeout(deadline, source.solicit(pack)).await {
                    Ok(Ok(reply)) => reply.into_vote(&id, weight),
                    Ok(Err(e)) => {
                        warn!(source = %id, error = %e, "Source failed");
                        VoteRecord::invalid(id, weight, e.to_string(), flags::PARSE_FAILURE)
                    }
                    Err(_) => {
                        warn!(source = %id, timeout_secs = deadline.as_secs(), "Source timed out");
                        VoteRecord::invalid(
                            id,
                            weight,
                            format!("timed out after {}s", deadline.as_secs()),
                            flags::TIMEOUT,
                        )
                    }
                }
            }
        });

        let mut votes = futures::future::join_all(solicitations).await;
        votes.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        votes
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// System prompt shared by all LLM sources.
pub fn system_prompt() -> &'static str {
    "You are one voting member of a basketball handicapping council. \
     You receive a complete fact sheet for a single NBA game and must \
     return an assessment of the moneyline.\n\n\
     RULES:\n\
     1. Use ONLY the facts provided. Do not rely on outside knowledge of \
        rosters, standings, or news, which may be stale.\n\
     2. Weigh form, rest, and injuries; do not simply echo the odds.\n\
     3. If a key player's status is ambiguous, raise your injury_uncertainty \
        and add the risk flag \"star_player_questionable\".\n\
     4. Respond with a single JSON object and nothing else, in exactly this shape:\n\
        {\n\
          \"favored\": \"home\" | \"away\",\n\
          \"support_prob\": 0.0-1.0,\n\
          \"injury_uncertainty\": 0.0-1.0,\n\
          \"risk_flags\": [\"...\"],\n\
          \"reason_codes\": [\"...\"],\n\
          \"rationale\": \"one or two sentences\"\n\
        }\n\
     5. support_prob is the win probability of the side named in \"favored\"."
}

/// Render the Fact Pack as the user prompt.
///
/// Everything a source may consider is in this text; nothing else is.
pub fn build_prompt(pack: &FactPack) -> String {
    let mut prompt = String::with_capacity(1500);

    prompt.push_str(&format!(
        "GAME: {} at {} (tip-off {})\n",
        pack.game.away_team,
        pack.game.home_team,
        pack.game.tip_off.format("%Y-%m-%d %H:%M UTC"),
    ));
    prompt.push_str(&format!(
        "MONEYLINE ({}): home {} / away {}\n\n",
        pack.odds.sportsbook, pack.odds.home_price, pack.odds.away_price,
    ));

    let home = &pack.team_form.home;
    let away = &pack.team_form.away;
    prompt.push_str(&format!(
        "HOME FORM: net rating {:+.1}, pace {:.1}, last-5 net {:+.1}\n",
        home.net_rating, home.pace, home.last5_net_rating,
    ));
    prompt.push_str(&format!(
        "AWAY FORM: net rating {:+.1}, pace {:.1}, last-5 net {:+.1}\n\n",
        away.net_rating, away.pace, away.last5_net_rating,
    ));

    let fmt_rest = |label: &str, rest: &crate::types::RestContext| {
        format!(
            "{label}: {} rest day(s){}\n",
            rest.rest_days,
            if rest.back_to_back {
                ", second night of a back-to-back"
            } else {
                ""
            },
        )
    };
    prompt.push_str(&fmt_rest("HOME REST", &pack.schedule.home));
    prompt.push_str(&fmt_rest("AWAY REST", &pack.schedule.away));

    prompt.push_str("\nINJURY REPORT:\n");
    if pack.injuries.is_empty() {
        prompt.push_str("- none listed\n");
    }
    for entry in &pack.injuries {
        prompt.push_str(&format!(
            "- [{}] {} ({}): expected minutes change {:+.0}, importance {:.2}, report confidence {:.2}\n",
            entry.side,
            entry.player,
            entry.status,
            entry.expected_minutes_delta,
            entry.importance,
            entry.source_confidence,
        ));
    }

    prompt.push_str("\nAssess the moneyline and answer in the required JSON shape.\n");
    prompt
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
