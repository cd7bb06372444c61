//! COURTSIDE: Consensus & Decision Gate Engine for NBA moneyline betting.
//!
//! One cycle turns an immutable game snapshot (the Fact Pack) into an
//! immutable `DecisionRecord`: a council of signal sources — a logistic
//! stats model and several LLMs — votes on the game, the votes are
//! aggregated into a weighted consensus, a set of gates decides whether
//! the edge is worth acting on, and a stake sizer converts the action
//! into a bankroll fraction.

pub mod config;
pub mod consensus;
pub mod council;
pub mod engine;
pub mod gate;
pub mod model;
pub mod stake;
pub mod types;

pub use config::AppConfig;
pub use engine::DecisionEngine;
pub use types::{Action, DecisionRecord, FactPack};
