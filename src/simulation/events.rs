//! Events emitted while a simulation runs and the sinks which consume them.
//!
//! The solver never writes progress or warnings anywhere itself; it hands events to an
//! [`EventSink`]. [`LogSink`] forwards them to the program logger.
use super::{ConvergenceStatus, MarketObservation};
use crate::units::{Price, Quantity};
use log::{Level, info, log, warn};

/// Something noteworthy which happened during a run
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationEvent {
    /// Demand and supply curves were sampled
    CurvesSampled {
        /// The number of sampled prices
        points: usize,
    },
    /// A step of the main loop was evaluated
    StepEvaluated(MarketObservation),
    /// There is no valid price bracket, so the solver is using proportional adjustment.
    ///
    /// Emitted at most once per run.
    NoValidBracket {
        /// The step at which this was first noticed
        step: u32,
    },
    /// The bracket has narrowed to within the price tolerance
    BracketNarrowed {
        /// The final bracket width
        width: Price,
        /// The estimated equilibrium price (the bracket's midpoint)
        price: Price,
    },
    /// The run converged
    Converged {
        /// Which convergence condition fired
        status: ConvergenceStatus,
        /// The step at which the run converged
        step: u32,
        /// The final price
        price: Price,
        /// Excess demand at the last evaluated price
        excess: Quantity,
    },
    /// The run reached the maximum number of steps without converging
    Exhausted {
        /// The maximum number of steps
        max_steps: u32,
        /// Excess demand at the last evaluated price
        last_excess: Option<Quantity>,
    },
}

/// Receives events from a running simulation
pub trait EventSink {
    /// Handle an event
    fn on_event(&mut self, event: &SimulationEvent);
}

impl<F: FnMut(&SimulationEvent)> EventSink for F {
    fn on_event(&mut self, event: &SimulationEvent) {
        self(event);
    }
}

impl EventSink for Vec<SimulationEvent> {
    fn on_event(&mut self, event: &SimulationEvent) {
        self.push(event.clone());
    }
}

/// Forwards events to the program logger
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    /// Log every step at info level rather than debug
    show_progress: bool,
}

impl LogSink {
    /// Create a new [`LogSink`]
    pub fn new(show_progress: bool) -> Self {
        Self { show_progress }
    }
}

impl EventSink for LogSink {
    fn on_event(&mut self, event: &SimulationEvent) {
        match event {
            SimulationEvent::CurvesSampled { points } => {
                info!("Sampled demand and supply curves at {points} prices");
            }
            SimulationEvent::StepEvaluated(observation) => {
                let level = if self.show_progress {
                    Level::Info
                } else {
                    Level::Debug
                };
                log!(
                    level,
                    "Step {}: price {:.3}, demand {:.3}, supply {:.3}, excess {:.3}",
                    observation.step,
                    observation.price.value(),
                    observation.demand.value(),
                    observation.supply.value(),
                    observation.excess.value()
                );
            }
            SimulationEvent::NoValidBracket { step } => warn!(
                "Running without a valid price bracket from step {step}; fallback adjustments \
                may oscillate"
            ),
            SimulationEvent::BracketNarrowed { width, price } => info!(
                "Equilibrium bracketed within {:.4} price units; estimated price {:.3}",
                width.value(),
                price.value()
            ),
            SimulationEvent::Converged {
                status,
                step,
                price,
                excess,
            } => info!(
                "Equilibrium reached at step {step} ({status}): price {:.3}, excess {:.3}",
                price.value(),
                excess.value()
            ),
            SimulationEvent::Exhausted {
                max_steps,
                last_excess,
            } => warn!(
                "Reached max steps ({max_steps}) without convergence; last excess={:.3}",
                last_excess.map_or(f64::NAN, Quantity::value)
            ),
        }
    }
}
