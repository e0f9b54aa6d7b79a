//! Functionality for running a tâtonnement simulation.
use crate::agent::MarketState;
use crate::config::SimulationConfig;
use crate::market::{Market, sample_curves};
use crate::units::Price;
use anyhow::{Context, Result};

pub mod events;
pub use events::{EventSink, LogSink, SimulationEvent};
pub mod history;
pub use history::{MarketObservation, SimulationHistory, SimulationResult};
pub mod solver;
pub use solver::ConvergenceStatus;
use solver::{BracketEnd, SolverState, Transition};

/// A simulation of price discovery in a single market
pub struct Simulation<'a> {
    market: &'a dyn Market,
    config: SimulationConfig,
}

impl<'a> Simulation<'a> {
    /// Create a new [`Simulation`], checking that `config` is valid
    pub fn new(market: &'a dyn Market, config: SimulationConfig) -> Result<Self> {
        config.validate().context("Invalid simulation config")?;

        Ok(Self { market, config })
    }

    /// The config used for runs
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run the simulation, reporting progress to the program logger
    pub fn run(&self) -> Result<SimulationResult<'a>> {
        let mut sink = LogSink::new(self.config.show_progress);
        self.run_with_sink(&mut sink)
    }

    /// Run the simulation, reporting progress to `sink`.
    ///
    /// Every run starts from scratch, so running twice gives the same trajectory as long as the
    /// agents' responses are deterministic.
    pub fn run_with_sink(&self, sink: &mut dyn EventSink) -> Result<SimulationResult<'a>> {
        let config = &self.config;
        let (lower, upper) = config.checked_bounds()?;

        let mut history = SimulationHistory::default();
        if config.record_state {
            let curves = sample_curves(
                self.market,
                config.curve_sampling.prices(),
                config.curve_sampling.verification(),
            )
            .context("Failed to sample demand and supply curves")?;
            sink.on_event(&SimulationEvent::CurvesSampled {
                points: curves.len(),
            });
            history.curves = Some(curves);
        }

        let mut solver = SolverState::new(
            config.clamp_price(config.price_init),
            self.evaluate_bound(lower),
            self.evaluate_bound(upper),
        );

        for step in 0..config.max_steps {
            let price = solver.price;
            let observation = self.market.observe(step, price);
            history.observations.push(observation);
            sink.on_event(&SimulationEvent::StepEvaluated(observation));

            if config.log_trades {
                let state = MarketState::at_price(Some(step), &price);
                history
                    .trades
                    .push(self.market.execute_trades(step, price, &state, true));
            }

            let outcome = solver.advance(observation.excess, config);
            if outcome.warn_no_bracket {
                sink.on_event(&SimulationEvent::NoValidBracket { step });
            }

            match outcome.transition {
                Transition::Continue => continue,
                Transition::ConvergedByBracket {
                    width,
                    final_price,
                    needs_final_observation,
                } => {
                    sink.on_event(&SimulationEvent::BracketNarrowed {
                        width,
                        price: final_price,
                    });
                    if needs_final_observation {
                        self.record_final_observation(&mut history, step, final_price);
                    }
                }
                Transition::ConvergedByTolerance | Transition::ConvergedByStepSize => {}
            }

            sink.on_event(&SimulationEvent::Converged {
                status: solver.status,
                step,
                price: solver.price,
                excess: observation.excess,
            });
            break;
        }

        if !solver.status.is_terminal() {
            solver.exhaust();
            sink.on_event(&SimulationEvent::Exhausted {
                max_steps: config.max_steps,
                last_excess: history.last_observation().map(|obs| obs.excess),
            });
        }

        if config.log_trades {
            self.settle_final_trade(&mut history);
        }

        Ok(SimulationResult {
            market: self.market,
            config: config.clone(),
            history,
            status: solver.status,
        })
    }

    /// Record an observation of the bracket midpoint after converging at `step`.
    ///
    /// The market is evaluated with the state for `step`, but the observation is recorded as the
    /// following step.
    fn record_final_observation(&self, history: &mut SimulationHistory, step: u32, price: Price) {
        let state = MarketState::at_price(Some(step), &price);
        history.observations.push(MarketObservation::new(
            step + 1,
            price,
            self.market.aggregate_demand(price, &state),
            self.market.aggregate_supply(price, &state),
        ));
    }

    /// Settle a trade at the last observation, if it doesn't have one already
    fn settle_final_trade(&self, history: &mut SimulationHistory) {
        if history.trades.len() >= history.observations.len() {
            return;
        }

        if let Some(last) = history.last_observation().copied() {
            let state = MarketState::at_price(Some(last.step), &last.price);
            history
                .trades
                .push(self.market.execute_trades(last.step, last.price, &state, true));
        }
    }

    /// Evaluate excess demand at one of the price bounds
    fn evaluate_bound(&self, price: Price) -> BracketEnd {
        let state = MarketState::at_price(None, &price);
        BracketEnd {
            price,
            excess: self.market.excess_demand(price, &state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentResponse, Side};
    use crate::fixture::{assert_error, fixed_supply_market, simple_market};
    use crate::id::{AgentID, HasID};
    use crate::market::{FixedSupplyMarket, VariableSupplyMarket};
    use crate::units::Quantity;
    use rstest::{fixture, rstest};

    /// A buyer whose demand is the current step number, whatever the price
    #[derive(Debug)]
    struct StepCountingBuyer(AgentID);

    impl HasID for StepCountingBuyer {
        fn get_id(&self) -> &AgentID {
            &self.0
        }
    }

    impl AgentResponse for StepCountingBuyer {
        fn side(&self) -> Side {
            Side::Buy
        }

        fn quantity(&self) -> Quantity {
            Quantity(1.0)
        }

        fn quantity_at_price(&self, _price: Price, state: &MarketState) -> Quantity {
            Quantity(state.step.unwrap_or_default() as f64)
        }
    }

    #[fixture]
    fn config() -> SimulationConfig {
        SimulationConfig {
            price_init: Price(1.0),
            price_bounds: (Price(0.5), Price(5.0)),
            record_state: false,
            ..SimulationConfig::default()
        }
    }

    fn run(
        market: &dyn Market,
        config: SimulationConfig,
    ) -> (SimulationResult<'_>, Vec<SimulationEvent>) {
        let mut events = Vec::new();
        let result = Simulation::new(market, config)
            .unwrap()
            .run_with_sink(&mut events)
            .unwrap();
        (result, events)
    }

    #[rstest]
    fn test_simple_market_converges(simple_market: VariableSupplyMarket, config: SimulationConfig) {
        let (result, _) = run(&simple_market, config);
        assert_eq!(result.status, ConvergenceStatus::ConvergedByTolerance);
        let prices: Vec<_> = result
            .history
            .observations
            .iter()
            .map(|obs| obs.price)
            .collect();
        assert_eq!(prices, [Price(1.0), Price(3.0), Price(2.0)]);
        assert_eq!(result.equilibrium().unwrap().excess, Quantity(0.0));
    }

    #[rstest]
    fn test_invalid_config(simple_market: VariableSupplyMarket, config: SimulationConfig) {
        let config = SimulationConfig {
            price_bounds: (Price(5.0), Price(1.0)),
            ..config
        };
        assert_error!(
            Simulation::new(&simple_market, config).map(|_| ()),
            "Invalid simulation config"
        );
    }

    #[rstest]
    fn test_events(simple_market: VariableSupplyMarket, config: SimulationConfig) {
        let config = SimulationConfig {
            record_state: true,
            ..config
        };
        let (result, events) = run(&simple_market, config);
        assert_eq!(
            events.first(),
            Some(&SimulationEvent::CurvesSampled {
                points: result.config.curve_sampling.points
            })
        );
        let steps = events
            .iter()
            .filter(|event| matches!(event, SimulationEvent::StepEvaluated(_)))
            .count();
        assert_eq!(steps, result.history.observations.len());
        assert!(matches!(
            events.last(),
            Some(SimulationEvent::Converged { step: 2, .. })
        ));
        assert!(result.history.curves.is_some());
    }

    #[rstest]
    fn test_trades_logged(simple_market: VariableSupplyMarket, config: SimulationConfig) {
        let config = SimulationConfig {
            log_trades: true,
            ..config
        };
        let (result, _) = run(&simple_market, config);
        assert_eq!(
            result.history.trades.len(),
            result.history.observations.len()
        );
        for (trade, obs) in result
            .history
            .trades
            .iter()
            .zip(&result.history.observations)
        {
            assert_eq!(trade.step, obs.step);
            assert_eq!(trade.price, obs.price);
        }
    }

    #[test]
    fn test_converged_by_bracket() {
        // Excess demand jumps straight from +1 to -1 at 2.0
        let market = VariableSupplyMarket::from_agents([
            Box::new(Agent::with_reservation_price("b", Side::Buy, Quantity(1.0), Price(2.0)).unwrap())
                as Box<dyn AgentResponse>,
            Box::new(Agent::with_reservation_price("s", Side::Sell, Quantity(1.0), Price(2.0)).unwrap())
                as Box<dyn AgentResponse>,
        ])
        .unwrap();
        let config = SimulationConfig {
            price_bounds: (Price(1.995), Price(2.004)),
            price_tolerance: Price(0.01),
            log_trades: true,
            record_state: false,
            ..SimulationConfig::default()
        };
        let (result, events) = run(&market, config);
        assert_eq!(result.status, ConvergenceStatus::ConvergedByBracket);

        // The midpoint is within tolerance of the evaluated price, so it is not evaluated again
        assert_eq!(result.history.observations.len(), 1);
        assert_eq!(result.history.trades.len(), 1);
        assert!(events
            .iter()
            .any(|event| matches!(event, SimulationEvent::BracketNarrowed { .. })));
        assert!(!events
            .iter()
            .any(|event| matches!(event, SimulationEvent::NoValidBracket { .. })));
    }

    #[rstest]
    fn test_fixed_supply_converges(fixed_supply_market: FixedSupplyMarket) {
        // Four buyers have reservation prices above 6 and the capacity is 4
        let config = SimulationConfig {
            price_init: Price(1.0),
            price_bounds: (Price(0.5), Price(12.0)),
            record_state: false,
            ..SimulationConfig::default()
        };
        let (result, _) = run(&fixed_supply_market, config);
        assert_eq!(result.status, ConvergenceStatus::ConvergedByTolerance);
        let price = result.equilibrium().unwrap().price;
        assert!(Price(6.0) <= price && price < Price(7.0));
    }

    #[rstest]
    fn test_final_observation_after_bracket(config: SimulationConfig) {
        let market = VariableSupplyMarket::from_agents([
            Box::new(StepCountingBuyer("b".into())) as Box<dyn AgentResponse>,
            Box::new(
                Agent::with_reservation_price("s", Side::Sell, Quantity(1.0), Price(1.0)).unwrap(),
            ),
        ])
        .unwrap();
        let config = SimulationConfig {
            log_trades: true,
            ..config
        };
        let simulation = Simulation::new(&market, config).unwrap();

        // Converged by bracket at step 3, with the midpoint far from the last price
        let mut history = SimulationHistory::default();
        let last = market.observe(3, Price(2.0));
        history.observations.push(last);
        let state = MarketState::at_price(Some(3), &last.price);
        history
            .trades
            .push(market.execute_trades(3, last.price, &state, true));

        let final_price = simulation.config().clamp_price(Price(6.0));
        simulation.record_final_observation(&mut history, 3, final_price);
        simulation.settle_final_trade(&mut history);

        // Recorded as step 4, but the buyer demands the quantity for step 3
        let obs = history.last_observation().unwrap();
        assert_eq!(obs.step, 4);
        assert_eq!(obs.price, Price(5.0));
        assert_eq!(obs.demand, Quantity(3.0));
        assert_eq!(obs.supply, Quantity(1.0));

        assert_eq!(history.trades.len(), history.observations.len());
        let trade = history.trades.last().unwrap();
        assert_eq!(trade.step, 4);
        assert_eq!(trade.price, Price(5.0));
        assert_eq!(trade.seller_ids, [AgentID::from("s")]);

        // Every observation now has a trade
        simulation.settle_final_trade(&mut history);
        assert_eq!(history.trades.len(), 2);
    }

    #[rstest]
    #[case(1.0)] // Clamped to the lower bound
    #[case(3.0)] // Clamped to the upper bound
    fn test_bracket_midpoint_near_last_price(#[case] price_init: f64) {
        // The last evaluated price is always an end of the final bracket, so the midpoint is
        // within half the price tolerance of it
        let market = VariableSupplyMarket::from_agents([
            Box::new(Agent::with_reservation_price("b", Side::Buy, Quantity(1.0), Price(2.0)).unwrap())
                as Box<dyn AgentResponse>,
            Box::new(Agent::with_reservation_price("s", Side::Sell, Quantity(1.0), Price(2.0)).unwrap())
                as Box<dyn AgentResponse>,
        ])
        .unwrap();
        let config = SimulationConfig {
            price_init: Price(price_init),
            price_bounds: (Price(1.995), Price(2.004)),
            price_tolerance: Price(0.01),
            log_trades: true,
            record_state: false,
            ..SimulationConfig::default()
        };
        let (result, events) = run(&market, config);
        assert_eq!(result.status, ConvergenceStatus::ConvergedByBracket);

        let Some(SimulationEvent::BracketNarrowed { price, .. }) = events
            .iter()
            .find(|event| matches!(event, SimulationEvent::BracketNarrowed { .. }))
        else {
            panic!("No BracketNarrowed event");
        };
        let last = result.equilibrium().unwrap();
        assert!((*price - last.price).abs() <= Price(0.005));
        assert_eq!(
            result.history.trades.len(),
            result.history.observations.len()
        );
    }
}
