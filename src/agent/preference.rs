//! Preference models, which score an agent's reservation price.
use super::MarketState;
use crate::units::Price;
use anyhow::{Result, ensure};

/// Maps an agent's features and the current market state to a reservation price.
///
/// Implementations must be deterministic for fixed inputs.
pub trait PreferenceModel: std::fmt::Debug {
    /// The reservation price for an agent with the given features
    fn reservation_price(&self, features: Option<&[f64]>, state: &MarketState) -> Price;

    /// Check that the given features can be scored by this model
    fn check_features(&self, _features: Option<&[f64]>) -> Result<()> {
        Ok(())
    }
}

/// A linear scoring function: `features · weights + bias`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearPreferenceModel {
    /// Feature weights. Required if the agent has features.
    pub weights: Option<Vec<f64>>,
    /// Constant term
    pub bias: f64,
}

impl LinearPreferenceModel {
    /// Create a new [`LinearPreferenceModel`]
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self {
            weights: Some(weights),
            bias,
        }
    }

    /// A model which always returns `reservation_price`, whatever the features
    pub fn constant(reservation_price: Price) -> Self {
        Self {
            weights: None,
            bias: reservation_price.value(),
        }
    }
}

impl PreferenceModel for LinearPreferenceModel {
    fn reservation_price(&self, features: Option<&[f64]>, _state: &MarketState) -> Price {
        let score = match (features, self.weights.as_deref()) {
            (Some(features), Some(weights)) => features
                .iter()
                .zip(weights)
                .map(|(feature, weight)| feature * weight)
                .sum::<f64>(),
            _ => 0.0,
        };

        Price(score + self.bias)
    }

    fn check_features(&self, features: Option<&[f64]>) -> Result<()> {
        let Some(features) = features else {
            return Ok(());
        };

        let Some(weights) = self.weights.as_deref() else {
            anyhow::bail!("Weights must be provided when features are present");
        };
        ensure!(
            features.len() == weights.len(),
            "Number of features ({}) does not match number of weights ({})",
            features.len(),
            weights.len()
        );
        ensure!(
            features.iter().chain(weights).all(|x| x.is_finite()),
            "Features and weights must be finite numbers"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_linear_reservation_price() {
        let model = LinearPreferenceModel::new(vec![2.0, -1.0], 0.5);
        let price = Price(1.0);
        let state = MarketState::at_price(Some(0), &price);
        assert_approx_eq!(
            Price,
            model.reservation_price(Some(&[1.5, 0.5]), &state),
            Price(3.0)
        );
    }

    #[test]
    fn test_linear_without_features_uses_bias() {
        let model = LinearPreferenceModel::constant(Price(2.5));
        let price = Price(1.0);
        let state = MarketState::at_price(None, &price);
        assert_eq!(model.reservation_price(None, &state), Price(2.5));
    }

    #[test]
    fn test_check_features() {
        let model = LinearPreferenceModel::new(vec![1.0, 2.0], 0.0);
        assert!(model.check_features(None).is_ok());
        assert!(model.check_features(Some(&[1.0, 1.0])).is_ok());
        assert!(model.check_features(Some(&[1.0])).is_err());
        assert!(model.check_features(Some(&[1.0, f64::NAN])).is_err());

        let constant = LinearPreferenceModel::constant(Price(1.0));
        assert!(constant.check_features(Some(&[1.0])).is_err());
    }
}
