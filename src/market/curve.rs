//! Sampling of demand and supply curves over a grid of prices.
use super::Market;
use crate::agent::MarketState;
use crate::units::{Dimensionless, Price, Quantity};
use anyhow::{Result, ensure};
use itertools::izip;

/// Demand and supply sampled over a grid of prices.
///
/// The three fields always have the same length and are index-aligned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CurveData {
    /// The sampled prices
    pub prices: Vec<Price>,
    /// Aggregate demand at each price
    pub demand: Vec<Quantity>,
    /// Aggregate supply at each price
    pub supply: Vec<Quantity>,
}

impl CurveData {
    /// The number of sampled points
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether no points were sampled
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Iterate over the sampled points as (price, demand, supply) tuples
    pub fn iter(&self) -> impl Iterator<Item = (Price, Quantity, Quantity)> + '_ {
        izip!(
            self.prices.iter().copied(),
            self.demand.iter().copied(),
            self.supply.iter().copied()
        )
    }
}

/// How to check the vectorised curves against the scalar path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    /// How many points to check, starting from the first
    pub samples: usize,
    /// The maximum permitted absolute difference between the two paths
    pub tolerance: Quantity,
}

/// `count` evenly spaced prices from `start` to `end` inclusive
pub fn linspace(start: Price, end: Price, count: usize) -> Vec<Price> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / Dimensionless((count - 1) as f64);
            (0..count)
                .map(|idx| start + step * Dimensionless(idx as f64))
                .collect()
        }
    }
}

/// Sample demand and supply curves for `market` using the vectorised path.
///
/// If `verification` is given, the first points are recomputed one at a time with the scalar path
/// and any disagreement beyond the tolerance is an error. The two paths must agree, so a
/// disagreement means one of them is wrong.
pub fn sample_curves(
    market: &dyn Market,
    prices: Vec<Price>,
    verification: Option<Verification>,
) -> Result<CurveData> {
    if prices.is_empty() {
        return Ok(CurveData::default());
    }

    let state = MarketState::new(Some(0), &prices);
    let demand = market.demand_curve(&prices, &state)?;
    let supply = market.supply_curve(&prices, &state)?;

    if let Some(verification) = verification {
        let check_count = verification.samples.min(prices.len());
        for (idx, &price) in prices.iter().enumerate().take(check_count) {
            let step = u32::try_from(idx)?;
            let state = MarketState::at_price(Some(step), &price);
            check_drift(
                "demand",
                idx,
                price,
                market.aggregate_demand(price, &state),
                demand[idx],
                verification.tolerance,
            )?;
            check_drift(
                "supply",
                idx,
                price,
                market.aggregate_supply(price, &state),
                supply[idx],
                verification.tolerance,
            )?;
        }
    }

    Ok(CurveData {
        prices,
        demand,
        supply,
    })
}

/// Check that the scalar and vectorised results for a point agree
fn check_drift(
    name: &str,
    idx: usize,
    price: Price,
    scalar: Quantity,
    vectorised: Quantity,
    tolerance: Quantity,
) -> Result<()> {
    let drift = (scalar - vectorised).abs();
    ensure!(
        drift <= tolerance,
        "Vectorised {name} drift {drift} exceeds verify_tolerance {tolerance} at index {idx} \
        (price {price})"
    );

    Ok(())
}
