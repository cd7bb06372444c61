//! Stats edge model.
//!
//! Maps Fact Pack features to a home win probability via a versioned
//! logistic parameter set, and computes the edge against the vig-free
//! market-implied probability. The parameters are a trained artifact
//! loaded from configuration — training happens elsewhere.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{CourtsideError, FactPack, Side};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Versioned logistic regression coefficients.
///
/// The intercept doubles as the home-advantage constant: with all
/// feature diffs at zero it alone sets P(home win) above 50%.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub version: String,
    pub intercept: f64,
    pub w_net_rating: f64,
    pub w_pace: f64,
    pub w_rest: f64,
    pub w_injury: f64,
    pub w_last5: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            version: "courtside-lr-v1".to_string(),
            intercept: 0.25, // home court ≈ 56% at even features
            w_net_rating: 0.14,
            w_pace: 0.01,
            w_rest: 0.08,
            w_injury: 0.035,
            w_last5: 0.05,
        }
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// Home-minus-away feature diffs extracted from a Fact Pack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub net_rating_diff: f64,
    pub pace_diff: f64,
    pub rest_diff: f64,
    /// Positive when the away roster carries the larger injury burden.
    pub injury_impact_diff: f64,
    pub last5_net_diff: f64,
}

impl FeatureVector {
    /// Extract features from a validated Fact Pack.
    pub fn from_fact_pack(pack: &FactPack) -> Result<Self, CourtsideError> {
        pack.validate()?;

        let home = &pack.team_form.home;
        let away = &pack.team_form.away;

        let home_burden: f64 = pack.injuries_for(Side::Home).map(|e| e.impact()).sum();
        let away_burden: f64 = pack.injuries_for(Side::Away).map(|e| e.impact()).sum();

        let features = Self {
            net_rating_diff: home.net_rating - away.net_rating,
            pace_diff: home.pace - away.pace,
            rest_diff: pack.schedule.home.rest_days as f64
                - pack.schedule.away.rest_days as f64,
            injury_impact_diff: away_burden - home_burden,
            last5_net_diff: home.last5_net_rating - away.last5_net_rating,
        };

        if !features.is_finite() {
            return Err(CourtsideError::ModelInput(
                "non-finite feature diff after extraction".to_string(),
            ));
        }

        Ok(features)
    }

    fn is_finite(&self) -> bool {
        self.net_rating_diff.is_finite()
            && self.pace_diff.is_finite()
            && self.rest_diff.is_finite()
            && self.injury_impact_diff.is_finite()
            && self.last5_net_diff.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// Model output for one game.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub p_home: f64,
    pub p_away: f64,
    /// Vig-free market-implied home probability.
    pub implied_home: f64,
    /// `p_home - implied_home`.
    pub edge: f64,
}

impl ModelPrediction {
    /// The side the model favors.
    pub fn favored(&self) -> Side {
        if self.p_home >= 0.5 {
            Side::Home
        } else {
            Side::Away
        }
    }
}

/// Deterministic feature-to-probability mapping.
pub struct StatsEdgeModel {
    params: ModelParams,
}

impl StatsEdgeModel {
    pub fn new(params: ModelParams) -> Self {
        Self { params }
    }

    /// Access the parameter set.
    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Predict the home win probability and market edge for one game.
    ///
    /// Pure function of the Fact Pack and the parameter set — identical
    /// inputs always produce an identical prediction.
    pub fn predict(&self, pack: &FactPack) -> Result<ModelPrediction, CourtsideError> {
        let f = FeatureVector::from_fact_pack(pack)?;
        let p = &self.params;

        let logit = p.intercept
            + p.w_net_rating * f.net_rating_diff
            + p.w_pace * f.pace_diff
            + p.w_rest * f.rest_diff
            + p.w_injury * f.injury_impact_diff
            + p.w_last5 * f.last5_net_diff;

        let p_home = sigmoid(logit);
        let implied_home = implied_home_no_vig(pack)?;
        let edge = p_home - implied_home;

        debug!(
            game_id = %pack.game.game_id,
            model_version = %p.version,
            p_home = format!("{:.1}%", p_home * 100.0),
            implied_home = format!("{:.1}%", implied_home * 100.0),
            edge = format!("{:+.1}%", edge * 100.0),
            "Model prediction"
        );

        Ok(ModelPrediction {
            p_home,
            p_away: 1.0 - p_home,
            implied_home,
            edge,
        })
    }
}

/// Logistic link function.
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Market-implied home probability with vig removed.
///
/// Both sides' raw implied probabilities are rescaled to sum to 1
/// before use, so the book's overround never inflates the edge.
pub fn implied_home_no_vig(pack: &FactPack) -> Result<f64, CourtsideError> {
    let raw_home = pack.odds.home_price.implied_prob()?;
    let raw_away = pack.odds.away_price.implied_prob()?;
    let total = raw_home + raw_away;
    if total <= 0.0 {
        return Err(CourtsideError::ModelInput(
            "implied probabilities sum to zero".to_string(),
        ));
    }
    Ok(raw_home / total)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InjuryEntry, InjuryStatus, MoneylinePrice};

    fn model() -> StatsEdgeModel {
        StatsEdgeModel::new(ModelParams::default())
    }

    #[test]
    fn test_feature_extraction() {
        let pack = FactPack::sample();
        let f = FeatureVector::from_fact_pack(&pack).unwrap();
        assert!((f.net_rating_diff - 3.1).abs() < 1e-10); // 4.2 - 1.1
        assert!((f.pace_diff - 1.7).abs() < 1e-9); // 101.5 - 99.8
        assert!((f.rest_diff - 2.0).abs() < 1e-10); // 2 - 0
        assert!((f.last5_net_diff - 8.5).abs() < 1e-10); // 6.0 - (-2.5)
        // Away bench player out: 0.3 * 0.9 * 18 = 4.86, away burden > home
        assert!((f.injury_impact_diff - 4.86).abs() < 1e-10);
    }

    #[test]
    fn test_feature_extraction_rejects_invalid_pack() {
        let mut pack = FactPack::sample();
        pack.team_form.home.pace = 0.0;
        assert!(FeatureVector::from_fact_pack(&pack).is_err());
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-10);
        assert!(sigmoid(50.0) > 0.999);
        assert!(sigmoid(-50.0) < 0.001);
    }

    #[test]
    fn test_prediction_probabilities_sum_to_one() {
        let pred = model().predict(&FactPack::sample()).unwrap();
        assert!((pred.p_home + pred.p_away - 1.0).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&pred.p_home));
    }

    #[test]
    fn test_prediction_deterministic() {
        let pack = FactPack::sample();
        let m = model();
        let a = m.predict(&pack).unwrap();
        let b = m.predict(&pack).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_home_edge_favors_stronger_home() {
        // Sample pack: home has better net rating, rest, and form, and
        // the away roster carries the injury burden.
        let pred = model().predict(&FactPack::sample()).unwrap();
        assert!(pred.p_home > 0.5, "p_home {} should exceed 0.5", pred.p_home);
        assert_eq!(pred.favored(), Side::Home);
    }

    #[test]
    fn test_vig_removal() {
        // -110 both sides: raw implied 0.5238 each, sums to 1.0476.
        // After rescaling, implied_home is exactly 0.5.
        let mut pack = FactPack::sample();
        pack.odds.home_price = MoneylinePrice::American(-110);
        pack.odds.away_price = MoneylinePrice::American(-110);
        let implied = implied_home_no_vig(&pack).unwrap();
        assert!((implied - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_vig_removal_asymmetric() {
        let mut pack = FactPack::sample();
        pack.odds.home_price = MoneylinePrice::American(-150); // raw 0.60
        pack.odds.away_price = MoneylinePrice::American(130); // raw 0.434783
        let implied = implied_home_no_vig(&pack).unwrap();
        let expected = 0.60 / (0.60 + 100.0 / 230.0);
        assert!((implied - expected).abs() < 1e-12);
    }

    #[test]
    fn test_decimal_prices_accepted() {
        let mut pack = FactPack::sample();
        pack.odds.home_price = MoneylinePrice::Decimal(1.80);
        pack.odds.away_price = MoneylinePrice::Decimal(2.10);
        let pred = model().predict(&pack).unwrap();
        assert!((0.0..=1.0).contains(&pred.implied_home));
    }

    #[test]
    fn test_edge_is_model_minus_implied() {
        let pred = model().predict(&FactPack::sample()).unwrap();
        assert!((pred.edge - (pred.p_home - pred.implied_home)).abs() < 1e-12);
    }

    #[test]
    fn test_injury_burden_shifts_probability() {
        let healthy = FactPack::sample();
        let mut hurt = healthy.clone();
        // Home star out — large home burden should lower p_home
        hurt.injuries.push(InjuryEntry {
            player: "Home Star".into(),
            side: Side::Home,
            status: InjuryStatus::Out,
            expected_minutes_delta: -36.0,
            importance: 1.0,
            source_confidence: 0.95,
        });

        let m = model();
        let p_healthy = m.predict(&healthy).unwrap().p_home;
        let p_hurt = m.predict(&hurt).unwrap().p_home;
        assert!(
            p_hurt < p_healthy,
            "home star out should lower p_home ({p_hurt} vs {p_healthy})"
        );
    }

    #[test]
    fn test_rest_advantage_shifts_probability() {
        let pack = FactPack::sample();
        let mut tired = pack.clone();
        tired.schedule.home.rest_days = 0;
        tired.schedule.home.back_to_back = true;

        let m = model();
        let p_rested = m.predict(&pack).unwrap().p_home;
        let p_tired = m.predict(&tired).unwrap().p_home;
        assert!(p_tired < p_rested);
    }

    #[test]
    fn test_default_params_version() {
        let params = ModelParams::default();
        assert_eq!(params.version, "courtside-lr-v1");
        assert!(params.intercept > 0.0); // home advantage
    }

    #[test]
    fn test_params_serialization_roundtrip() {
        let params = ModelParams::default();
        let toml_str = toml::to_string(&params).unwrap();
        let parsed: ModelParams = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.version, params.version);
        assert!((parsed.w_net_rating - params.w_net_rating).abs() < 1e-12);
    }
}
