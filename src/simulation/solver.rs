//! The state machine which chooses the next candidate price.
//!
//! [`SolverState`] holds everything which changes from one step to the next. It performs no I/O:
//! the caller evaluates the market, passes the excess demand to [`SolverState::advance`] and acts
//! on the returned [`StepOutcome`].
use crate::config::SimulationConfig;
use crate::units::{Price, Quantity};
use serde::Serialize;

/// The state of a simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConvergenceStatus {
    /// The run has not yet terminated
    Running,
    /// Excess demand fell within the excess tolerance
    ConvergedByTolerance,
    /// The price bracket narrowed to within the price tolerance
    ConvergedByBracket,
    /// The price changed by no more than the price tolerance
    ConvergedByStepSize,
    /// The maximum number of steps was reached
    Exhausted,
}

impl ConvergenceStatus {
    /// Whether this is a terminal state
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }

    /// Whether this is one of the convergence states
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            Self::ConvergedByTolerance | Self::ConvergedByBracket | Self::ConvergedByStepSize
        )
    }
}

/// One end of the price bracket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketEnd {
    /// The price at this end
    pub price: Price,
    /// The most recent excess demand recorded for this end
    pub excess: Quantity,
}

/// What happened as a result of a single step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Carry on with the next price
    Continue,
    /// The evaluated price is the equilibrium
    ConvergedByTolerance,
    /// The bracket is narrow enough
    ConvergedByBracket {
        /// The width of the final bracket
        width: Price,
        /// The midpoint of the bracket, clamped to bounds
        final_price: Price,
        /// Whether `final_price` is far enough from the last evaluated price to be evaluated too
        needs_final_observation: bool,
    },
    /// The next price is too close to the current one to be worth evaluating
    ConvergedByStepSize,
}

/// The outcome of [`SolverState::advance`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// The resulting transition
    pub transition: Transition,
    /// Whether the caller should warn that there is no valid bracket.
    ///
    /// This is set on the first step without a valid bracket only.
    pub warn_no_bracket: bool,
}

/// The state carried between steps of a run
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    /// The price to evaluate next (or the final price, once terminated)
    pub price: Price,
    /// The lower end of the bracket
    pub lower: BracketEnd,
    /// The upper end of the bracket
    pub upper: BracketEnd,
    /// Whether the no-bracket warning has already been requested
    pub bracket_warning_issued: bool,
    /// The current state of the run
    pub status: ConvergenceStatus,
}

impl SolverState {
    /// Create a new [`SolverState`] with the bracket set to the price bounds
    pub fn new(price: Price, lower: BracketEnd, upper: BracketEnd) -> Self {
        Self {
            price,
            lower,
            upper,
            bracket_warning_issued: false,
            status: ConvergenceStatus::Running,
        }
    }

    /// Whether excess demand changes sign across the bracket
    pub fn bracket_is_valid(&self) -> bool {
        self.lower.excess > Quantity(0.0) && self.upper.excess < Quantity(0.0)
    }

    /// The width of the bracket
    pub fn bracket_width(&self) -> Price {
        self.upper.price - self.lower.price
    }

    /// Update the state given the excess demand observed at [`Self::price`].
    ///
    /// # Panics
    ///
    /// If the run has already terminated.
    pub fn advance(&mut self, excess: Quantity, config: &SimulationConfig) -> StepOutcome {
        assert!(
            !self.status.is_terminal(),
            "Cannot advance a run which has terminated ({})",
            self.status
        );

        let price = self.price;
        if excess.abs() <= config.excess_tolerance {
            self.status = ConvergenceStatus::ConvergedByTolerance;
            return StepOutcome {
                transition: Transition::ConvergedByTolerance,
                warn_no_bracket: false,
            };
        }

        if excess > Quantity(0.0) {
            self.lower = BracketEnd {
                price: self.lower.price.max(price),
                excess,
            };
        } else if excess < Quantity(0.0) {
            self.upper = BracketEnd {
                price: self.upper.price.min(price),
                excess,
            };
        }

        let bracket_valid = self.bracket_is_valid();
        let warn_no_bracket = !bracket_valid && !self.bracket_warning_issued;
        if warn_no_bracket {
            self.bracket_warning_issued = true;
        }

        let outcome = |transition| StepOutcome {
            transition,
            warn_no_bracket,
        };

        let midpoint = self.lower.price.midpoint(self.upper.price);
        if bracket_valid && self.bracket_width() <= config.price_tolerance {
            let final_price = config.clamp_price(midpoint);
            self.price = final_price;
            self.status = ConvergenceStatus::ConvergedByBracket;
            return outcome(Transition::ConvergedByBracket {
                width: self.bracket_width(),
                final_price,
                needs_final_observation: (final_price - price).abs() > config.price_tolerance,
            });
        }

        let next_price = if bracket_valid {
            midpoint
        } else {
            config.clamp_price(price + excess * config.adjustment_rate)
        };
        self.price = next_price;

        if (next_price - price).abs() <= config.price_tolerance {
            self.status = ConvergenceStatus::ConvergedByStepSize;
            return outcome(Transition::ConvergedByStepSize);
        }

        outcome(Transition::Continue)
    }

    /// Mark the run as having run out of steps
    pub fn exhaust(&mut self) {
        if !self.status.is_terminal() {
            self.status = ConvergenceStatus::Exhausted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::PricePerQuantity;
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> SimulationConfig {
        SimulationConfig {
            price_bounds: (Price(0.5), Price(5.0)),
            excess_tolerance: Quantity(1e-3),
            price_tolerance: Price(1e-3),
            adjustment_rate: PricePerQuantity(0.1),
            ..SimulationConfig::default()
        }
    }

    fn end(price: f64, excess: f64) -> BracketEnd {
        BracketEnd {
            price: Price(price),
            excess: Quantity(excess),
        }
    }

    #[rstest]
    fn test_converged_by_tolerance(config: SimulationConfig) {
        let mut state = SolverState::new(Price(2.0), end(0.5, 1.0), end(5.0, -1.0));
        let outcome = state.advance(Quantity(5e-4), &config);
        assert_eq!(outcome.transition, Transition::ConvergedByTolerance);
        assert!(!outcome.warn_no_bracket);
        assert_eq!(state.status, ConvergenceStatus::ConvergedByTolerance);
        assert_eq!(state.price, Price(2.0));
    }

    #[rstest]
    fn test_bisection(config: SimulationConfig) {
        let mut state = SolverState::new(Price(1.0), end(0.5, 1.0), end(5.0, -1.0));
        let outcome = state.advance(Quantity(1.0), &config);
        assert_eq!(outcome.transition, Transition::Continue);
        assert_eq!(state.lower, end(1.0, 1.0));
        assert_eq!(state.price, Price(3.0));

        let outcome = state.advance(Quantity(-1.0), &config);
        assert_eq!(outcome.transition, Transition::Continue);
        assert_eq!(state.upper, end(3.0, -1.0));
        assert_eq!(state.price, Price(2.0));
        assert_eq!(state.status, ConvergenceStatus::Running);
    }

    #[rstest]
    fn test_bracket_only_narrows(config: SimulationConfig) {
        // Positive excess below the current lower end keeps the lower price
        let mut state = SolverState::new(Price(0.8), end(1.0, 1.0), end(5.0, -1.0));
        state.advance(Quantity(2.0), &config);
        assert_eq!(state.lower, end(1.0, 2.0));
    }

    #[rstest]
    fn test_fallback_adjustment(config: SimulationConfig) {
        // No sign change across the bounds
        let mut state = SolverState::new(Price(1.0), end(0.5, 2.0), end(5.0, 2.0));
        let outcome = state.advance(Quantity(2.0), &config);
        assert_eq!(outcome.transition, Transition::Continue);
        assert!(outcome.warn_no_bracket);
        assert_approx_eq!(Price, state.price, Price(1.2));

        // The warning is only requested once
        let outcome = state.advance(Quantity(2.0), &config);
        assert!(!outcome.warn_no_bracket);
        assert!(state.bracket_warning_issued);
    }

    #[rstest]
    fn test_fallback_adjustment_clamped(config: SimulationConfig) {
        let mut state = SolverState::new(Price(4.9), end(0.5, 50.0), end(5.0, 50.0));
        state.advance(Quantity(50.0), &config);
        assert_eq!(state.price, Price(5.0));
    }

    #[rstest]
    fn test_converged_by_bracket(config: SimulationConfig) {
        let mut state = SolverState::new(Price(2.0), end(1.9996, 1.0), end(2.0008, -1.0));
        let outcome = state.advance(Quantity(-1.0), &config);
        let Transition::ConvergedByBracket {
            width,
            final_price,
            needs_final_observation,
        } = outcome.transition
        else {
            panic!("Unexpected transition: {:?}", outcome.transition)
        };
        assert_approx_eq!(Price, width, Price(4e-4), epsilon = 1e-12);
        assert_approx_eq!(Price, final_price, Price(1.9998), epsilon = 1e-12);
        assert!(!needs_final_observation);
        assert_eq!(state.status, ConvergenceStatus::ConvergedByBracket);
        assert_eq!(state.price, final_price);
    }

    #[rstest]
    fn test_converged_by_bracket_far_from_last_price(config: SimulationConfig) {
        // The evaluated price lies outside the bracket, so the midpoint is a new price
        let mut state = SolverState::new(Price(3.0), end(2.0, 1.0), end(2.0005, -1.0));
        let outcome = state.advance(Quantity(-1.0), &config);
        assert!(matches!(
            outcome.transition,
            Transition::ConvergedByBracket {
                needs_final_observation: true,
                ..
            }
        ));
    }

    #[rstest]
    fn test_converged_by_step_size(config: SimulationConfig) {
        // Tiny excess with no bracket moves the price by less than the tolerance
        let mut state = SolverState::new(Price(1.0), end(0.5, 1.0), end(5.0, 1.0));
        let outcome = state.advance(Quantity(0.005), &config);
        assert_eq!(outcome.transition, Transition::ConvergedByStepSize);
        assert_eq!(state.status, ConvergenceStatus::ConvergedByStepSize);
        assert_approx_eq!(Price, state.price, Price(1.0005));
    }

    #[rstest]
    #[should_panic(expected = "Cannot advance a run which has terminated")]
    fn test_advance_after_termination(config: SimulationConfig) {
        let mut state = SolverState::new(Price(1.0), end(0.5, 1.0), end(5.0, -1.0));
        state.advance(Quantity(0.0), &config);
        state.advance(Quantity(0.0), &config);
    }

    #[test]
    fn test_exhaust() {
        let mut state = SolverState::new(Price(1.0), end(0.5, 1.0), end(5.0, -1.0));
        state.exhaust();
        assert_eq!(state.status, ConvergenceStatus::Exhausted);
        assert!(!state.status.is_converged());
    }

    #[rstest]
    #[case(ConvergenceStatus::Running, false, false)]
    #[case(ConvergenceStatus::ConvergedByTolerance, true, true)]
    #[case(ConvergenceStatus::ConvergedByBracket, true, true)]
    #[case(ConvergenceStatus::ConvergedByStepSize, true, true)]
    #[case(ConvergenceStatus::Exhausted, true, false)]
    fn test_status(
        #[case] status: ConvergenceStatus,
        #[case] terminal: bool,
        #[case] converged: bool,
    ) {
        assert_eq!(status.is_terminal(), terminal);
        assert_eq!(status.is_converged(), converged);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(
            ConvergenceStatus::ConvergedByBracket.to_string(),
            "converged_by_bracket"
        );
    }
}
