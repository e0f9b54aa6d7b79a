//! Defines the [`SimulationConfig`] struct, which holds the parameters governing a single run.
use crate::market::curve::{Verification, linspace};
use crate::units::{Price, PricePerQuantity, Quantity};
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

macro_rules! define_unit_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            <$type>::new($value)
        }
    };
}

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_unit_param_default!(default_price_init, Price, 1.0);
define_unit_param_default!(default_excess_tolerance, Quantity, 1e-3);
define_unit_param_default!(default_price_tolerance, Price, 1e-3);
define_unit_param_default!(default_adjustment_rate, PricePerQuantity, 0.05);
define_unit_param_default!(default_curve_price_min, Price, 0.25);
define_unit_param_default!(default_curve_price_max, Price, 5.0);
define_unit_param_default!(default_verify_tolerance, Quantity, 1e-6);
define_param_default!(default_max_steps, u32, 250);
define_param_default!(default_price_bounds, (Price, Price), (Price(0.05), Price(25.0)));
define_param_default!(default_curve_points, usize, 64);
define_param_default!(default_verify_samples, usize, 5);
define_param_default!(default_true, bool, true);

/// Settings used when sampling demand and supply curves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurveSamplingConfig {
    /// The lowest sampled price
    #[serde(default = "default_curve_price_min")]
    pub price_min: Price,
    /// The highest sampled price
    #[serde(default = "default_curve_price_max")]
    pub price_max: Price,
    /// The number of evenly spaced prices to sample
    #[serde(default = "default_curve_points")]
    pub points: usize,
    /// Whether to check the sampled curves against the scalar path
    #[serde(default = "default_true")]
    pub verify: bool,
    /// How many of the sampled points to check
    #[serde(default = "default_verify_samples")]
    pub verify_samples: usize,
    /// The maximum permitted drift between the two paths
    #[serde(default = "default_verify_tolerance")]
    pub verify_tolerance: Quantity,
}

impl Default for CurveSamplingConfig {
    fn default() -> Self {
        Self {
            price_min: default_curve_price_min(),
            price_max: default_curve_price_max(),
            points: default_curve_points(),
            verify: true,
            verify_samples: default_verify_samples(),
            verify_tolerance: default_verify_tolerance(),
        }
    }
}

impl CurveSamplingConfig {
    /// The grid of prices to sample
    pub fn prices(&self) -> Vec<Price> {
        linspace(self.price_min, self.price_max, self.points)
    }

    /// The verification to perform, if any
    pub fn verification(&self) -> Option<Verification> {
        self.verify.then_some(Verification {
            samples: self.verify_samples,
            tolerance: self.verify_tolerance,
        })
    }

    /// Validate the curve sampling parameters
    fn validate(&self) -> Result<()> {
        ensure!(
            self.price_min.is_finite() && self.price_max.is_finite(),
            "curve_sampling prices must be finite numbers"
        );
        ensure!(
            self.price_min <= self.price_max,
            "curve_sampling.price_min ({}) must not exceed curve_sampling.price_max ({})",
            self.price_min,
            self.price_max
        );
        ensure!(
            self.verify_tolerance.is_finite() && self.verify_tolerance >= Quantity(0.0),
            "curve_sampling.verify_tolerance must be a finite number greater than or equal to zero"
        );

        Ok(())
    }
}

/// Parameters governing the convergence of a simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// The price at which the first step is evaluated
    #[serde(default = "default_price_init")]
    pub price_init: Price,
    /// The maximum number of steps to run for
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Excess demand within this distance of zero counts as equilibrium
    #[serde(default = "default_excess_tolerance")]
    pub excess_tolerance: Quantity,
    /// Bracket widths and price changes within this tolerance count as converged
    #[serde(default = "default_price_tolerance")]
    pub price_tolerance: Price,
    /// How far to move the price per unit of excess demand when there is no valid bracket
    #[serde(default = "default_adjustment_rate")]
    pub adjustment_rate: PricePerQuantity,
    /// The lower and upper bounds for candidate prices
    #[serde(default = "default_price_bounds")]
    pub price_bounds: (Price, Price),
    /// Whether to settle and record trades at every step
    #[serde(default)]
    pub log_trades: bool,
    /// Whether to sample demand and supply curves before the run
    #[serde(default = "default_true")]
    pub record_state: bool,
    /// Whether to report the progress of every step at info level
    #[serde(default = "default_true")]
    pub show_progress: bool,
    /// Settings for curve sampling
    #[serde(default)]
    pub curve_sampling: CurveSamplingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            price_init: default_price_init(),
            max_steps: default_max_steps(),
            excess_tolerance: default_excess_tolerance(),
            price_tolerance: default_price_tolerance(),
            adjustment_rate: default_adjustment_rate(),
            price_bounds: default_price_bounds(),
            log_trades: false,
            record_state: true,
            show_progress: true,
            curve_sampling: CurveSamplingConfig::default(),
        }
    }
}

/// Check that the `price_bounds` parameter is valid, returning the clamped bounds
fn check_price_bounds(bounds: (Price, Price)) -> Result<(Price, Price)> {
    let (lower, upper) = bounds;
    ensure!(
        lower.is_finite() && upper.is_finite(),
        "price_bounds must be finite numbers (got lower={lower}, upper={upper})"
    );

    let clamped = (clamp(lower, bounds), clamp(upper, bounds));
    ensure!(
        clamped.0 < clamped.1,
        "price_bounds must satisfy lower < upper (got lower={lower}, upper={upper})"
    );

    Ok(clamped)
}

/// Check that a tolerance parameter is valid
fn check_tolerance(name: &str, value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "{name} must be a finite number greater than or equal to zero"
    );

    Ok(())
}

/// Clamp `price` to lie within `bounds`
fn clamp(price: Price, bounds: (Price, Price)) -> Price {
    let (lower, upper) = bounds;
    lower.max(upper.min(price))
}

impl SimulationConfig {
    /// Create a config from the TOML representation of a [`SimulationConfig`]
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;

        Ok(config)
    }

    /// Create a copy of this config with the named options replaced.
    ///
    /// Unknown option names are an error.
    pub fn with_overrides(&self, overrides: &toml::Table) -> Result<Self> {
        let mut value = toml::Value::try_from(self)?;
        let table = value
            .as_table_mut()
            .context("Simulation config is not a table")?;
        for (key, option) in overrides {
            ensure!(
                table.contains_key(key),
                "Unknown simulation option '{key}'"
            );
            table.insert(key.clone(), option.clone());
        }

        let config: Self = value
            .try_into()
            .context("Invalid value for simulation option")?;
        config.validate()?;

        Ok(config)
    }

    /// Clamp `price` to lie within the configured bounds
    pub fn clamp_price(&self, price: Price) -> Price {
        clamp(price, self.price_bounds)
    }

    /// The price bounds after clamping, checked to satisfy lower < upper
    pub fn checked_bounds(&self) -> Result<(Price, Price)> {
        check_price_bounds(self.price_bounds)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        // price_bounds
        self.checked_bounds()?;

        // price_init
        ensure!(
            self.price_init.is_finite(),
            "price_init must be a finite number"
        );

        // max_steps
        ensure!(self.max_steps > 0, "max_steps cannot be zero");

        // excess_tolerance
        check_tolerance("excess_tolerance", self.excess_tolerance.value())?;

        // price_tolerance
        check_tolerance("price_tolerance", self.price_tolerance.value())?;

        // adjustment_rate
        ensure!(
            self.adjustment_rate.is_finite() && self.adjustment_rate > PricePerQuantity(0.0),
            "adjustment_rate must be a finite number greater than zero"
        );

        self.curve_sampling.validate()
    }
}
