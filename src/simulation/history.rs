//! The trajectory recorded during a simulation run.
use super::ConvergenceStatus;
use crate::config::SimulationConfig;
use crate::market::{CurveData, Market, TradeRecord};
use crate::units::{Price, Quantity};

/// Demand and supply observed at one point of the trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketObservation {
    /// The simulation step
    pub step: u32,
    /// The price evaluated
    pub price: Price,
    /// Aggregate demand at `price`
    pub demand: Quantity,
    /// Aggregate supply at `price`
    pub supply: Quantity,
    /// Always `demand - supply`
    pub excess: Quantity,
}

impl MarketObservation {
    /// Create a new [`MarketObservation`], computing excess demand
    pub fn new(step: u32, price: Price, demand: Quantity, supply: Quantity) -> Self {
        Self {
            step,
            price,
            demand,
            supply,
            excess: demand - supply,
        }
    }
}

/// Everything recorded during a single run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationHistory {
    /// One observation per evaluated price, in order
    pub observations: Vec<MarketObservation>,
    /// Trades settled during the run (empty unless trades are logged)
    pub trades: Vec<TradeRecord>,
    /// Demand and supply curves sampled before the run, if requested
    pub curves: Option<CurveData>,
}

impl SimulationHistory {
    /// The most recent observation, if any
    pub fn last_observation(&self) -> Option<&MarketObservation> {
        self.observations.last()
    }
}

/// The outcome of a simulation run
pub struct SimulationResult<'a> {
    /// The market which was simulated
    pub market: &'a dyn Market,
    /// The config used for the run
    pub config: SimulationConfig,
    /// The recorded trajectory
    pub history: SimulationHistory,
    /// How the run terminated
    pub status: ConvergenceStatus,
}

impl SimulationResult<'_> {
    /// The reported equilibrium, i.e. the final observation.
    ///
    /// If the run was exhausted this may be far from a market-clearing price.
    pub fn equilibrium(&self) -> Option<&MarketObservation> {
        self.history.last_observation()
    }

    /// Whether the run ended with any of the convergence conditions
    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }
}
