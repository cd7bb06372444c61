//! Stake sizing.
//!
//! Converts a gate action into a bankroll fraction under one of two
//! policies: a flat safe fraction, or fractional Kelly. Either way the
//! fraction is capped hard; the cap is the last line of defence against
//! a confidently wrong consensus.

use tracing::debug;

use crate::config::StakeConfig;
use crate::types::{Action, CourtsideError};

/// How bet fractions are computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StakePolicy {
    /// Fixed fraction per bet, regardless of edge size.
    Safe { flat_fraction: f64, cap: f64 },
    /// Kelly criterion scaled down by a multiplier.
    FractionalKelly { multiplier: f64, cap: f64 },
}

impl StakePolicy {
    /// Conventional defaults: 1% flat, 3% cap.
    pub fn safe_default() -> Self {
        StakePolicy::Safe {
            flat_fraction: 0.01,
            cap: 0.03,
        }
    }

    /// Conventional defaults: quarter Kelly, 3% cap.
    pub fn fractional_kelly_default() -> Self {
        StakePolicy::FractionalKelly {
            multiplier: 0.25,
            cap: 0.03,
        }
    }

    /// Build from configuration.
    pub fn from_config(cfg: &StakeConfig) -> Result<Self, CourtsideError> {
        match cfg.policy.as_str() {
            "safe" => Ok(StakePolicy::Safe {
                flat_fraction: cfg.flat_fraction,
                cap: cfg.cap,
            }),
            "fractional_kelly" => Ok(StakePolicy::FractionalKelly {
                multiplier: cfg.kelly_multiplier,
                cap: cfg.cap,
            }),
            other => Err(CourtsideError::Config(format!(
                "unknown stake policy: {other}"
            ))),
        }
    }

    fn cap(&self) -> f64 {
        match *self {
            StakePolicy::Safe { cap, .. } => cap,
            StakePolicy::FractionalKelly { cap, .. } => cap,
        }
    }
}

/// Computes the bankroll fraction for one decision.
pub struct StakeSizer {
    policy: StakePolicy,
}

impl StakeSizer {
    pub fn new(policy: StakePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &StakePolicy {
        &self.policy
    }

    /// Fraction of bankroll to stake for `action`.
    ///
    /// `p_win` is the consensus probability of the side being bet and
    /// `net_odds` the profit per unit staked at the taken price.
    /// Non-betting actions always size to exactly 0.0. For betting
    /// actions a non-positive bankroll or non-positive net odds is an
    /// input error, not a silent zero.
    pub fn size(
        &self,
        action: Action,
        p_win: f64,
        net_odds: f64,
        bankroll: f64,
    ) -> Result<f64, CourtsideError> {
        if !action.is_bet() {
            return Ok(0.0);
        }
        if bankroll <= 0.0 || !bankroll.is_finite() {
            return Err(CourtsideError::InvalidStakeInput(format!(
                "bankroll {bankroll} must be positive for a betting action"
            )));
        }
        if net_odds <= 0.0 || !net_odds.is_finite() {
            return Err(CourtsideError::InvalidStakeInput(format!(
                "net odds {net_odds} must be positive for a betting action"
            )));
        }
        if !(0.0..=1.0).contains(&p_win) {
            return Err(CourtsideError::InvalidStakeInput(format!(
                "win probability {p_win} outside [0, 1]"
            )));
        }

        let full = match self.policy {
            StakePolicy::Safe { flat_fraction, cap } => flat_fraction.clamp(0.0, cap),
            StakePolicy::FractionalKelly { multiplier, cap } => {
                let kelly = kelly_fraction(p_win, net_odds);
                (multiplier * kelly).clamp(0.0, cap)
            }
        };

        let fraction = match action {
            Action::BetMax => full,
            Action::BetSmall => full / 2.0,
            Action::NoBet | Action::Pass => unreachable!("handled above"),
        };

        debug!(
            action = %action,
            p_win = format!("{:.1}%", p_win * 100.0),
            net_odds = format!("{:.2}", net_odds),
            fraction = format!("{:.3}%", fraction * 100.0),
            "Stake sized"
        );

        Ok(fraction)
    }
}

/// Full Kelly fraction `(b*p - q) / b`, floored at zero.
///
/// Negative Kelly means the price offers no value at the believed
/// probability; the fraction is never allowed below zero.
pub fn kelly_fraction(p_win: f64, net_odds: f64) -> f64 {
    let q = 1.0 - p_win;
    ((net_odds * p_win - q) / net_odds).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kelly_sizer() -> StakeSizer {
        StakeSizer::new(StakePolicy::fractional_kelly_default())
    }

    fn safe_sizer() -> StakeSizer {
        StakeSizer::new(StakePolicy::safe_default())
    }

    #[test]
    fn test_kelly_fraction_basic() {
        // p=0.55, b=1.0: (0.55 - 0.45) / 1.0 = 0.10
        assert!((kelly_fraction(0.55, 1.0) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_kelly_fraction_negative_floors_to_zero() {
        // p=0.40 at even odds has negative expectation
        assert_eq!(kelly_fraction(0.40, 1.0), 0.0);
    }

    #[test]
    fn test_kelly_fraction_longshot() {
        // p=0.30, b=3.0: (0.9 - 0.7) / 3 = 0.0667
        assert!((kelly_fraction(0.30, 3.0) - 0.2 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_fractional_kelly_bet_max() {
        // Quarter Kelly of 0.10 = 0.025, under the 0.03 cap
        let f = kelly_sizer()
            .size(Action::BetMax, 0.55, 1.0, 10_000.0)
            .unwrap();
        assert!((f - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_bet_small_is_half() {
        let max = kelly_sizer()
            .size(Action::BetMax, 0.55, 1.0, 10_000.0)
            .unwrap();
        let small = kelly_sizer()
            .size(Action::BetSmall, 0.55, 1.0, 10_000.0)
            .unwrap();
        assert!((small - max / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_cap_applies() {
        // p=0.70, b=1.0: full Kelly 0.40, quarter 0.10 — capped at 0.03
        let f = kelly_sizer()
            .size(Action::BetMax, 0.70, 1.0, 10_000.0)
            .unwrap();
        assert!((f - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_negative_kelly_sizes_zero_even_for_bet_actions() {
        let f = kelly_sizer()
            .size(Action::BetMax, 0.40, 1.0, 10_000.0)
            .unwrap();
        assert_eq!(f, 0.0);
    }

    #[test]
    fn test_safe_policy_flat() {
        let f = safe_sizer()
            .size(Action::BetMax, 0.55, 1.0, 10_000.0)
            .unwrap();
        assert!((f - 0.01).abs() < 1e-12);
        // Flat fraction ignores how big the edge is
        let f2 = safe_sizer()
            .size(Action::BetMax, 0.90, 1.0, 10_000.0)
            .unwrap();
        assert_eq!(f, f2);
    }

    #[test]
    fn test_no_bet_and_pass_are_zero() {
        assert_eq!(
            kelly_sizer().size(Action::NoBet, 0.55, 1.0, 10_000.0).unwrap(),
            0.0
        );
        assert_eq!(
            kelly_sizer().size(Action::Pass, 0.55, 1.0, 10_000.0).unwrap(),
            0.0
        );
    }

    #[test]
    fn test_zero_bankroll_ok_for_non_bet() {
        // Non-betting actions never touch the bankroll
        assert_eq!(
            kelly_sizer().size(Action::Pass, 0.55, 1.0, 0.0).unwrap(),
            0.0
        );
    }

    #[test]
    fn test_invalid_bankroll_for_bet() {
        let err = kelly_sizer()
            .size(Action::BetMax, 0.55, 1.0, 0.0)
            .unwrap_err();
        assert!(matches!(err, CourtsideError::InvalidStakeInput(_)));
        assert!(kelly_sizer()
            .size(Action::BetSmall, 0.55, 1.0, -100.0)
            .is_err());
    }

    #[test]
    fn test_invalid_net_odds_for_bet() {
        assert!(kelly_sizer()
            .size(Action::BetMax, 0.55, 0.0, 10_000.0)
            .is_err());
        assert!(kelly_sizer()
            .size(Action::BetMax, 0.55, -1.5, 10_000.0)
            .is_err());
    }

    #[test]
    fn test_invalid_probability_for_bet() {
        assert!(kelly_sizer()
            .size(Action::BetMax, 1.2, 1.0, 10_000.0)
            .is_err());
    }

    #[test]
    fn test_policy_from_config() {
        let cfg = StakeConfig {
            policy: "safe".to_string(),
            flat_fraction: 0.015,
            kelly_multiplier: 0.25,
            cap: 0.03,
        };
        assert_eq!(
            StakePolicy::from_config(&cfg).unwrap(),
            StakePolicy::Safe {
                flat_fraction: 0.015,
                cap: 0.03
            }
        );

        let bad = StakeConfig {
            policy: "martingale".to_string(),
            ..cfg
        };
        assert!(StakePolicy::from_config(&bad).is_err());
    }
}
