//! An example market in which households rent apartments from landlords.
//!
//! Both sides score their reservation price (rent) with a linear model over a few features.
//! Populations can be generated at random from a seed, which is how the bundled example models
//! are built.
use crate::agent::preference::LinearPreferenceModel;
use crate::agent::{Agent, AgentResponse, Side};
use crate::config::{CurveSamplingConfig, SimulationConfig};
use crate::market::{FixedSupplyMarket, VariableSupplyMarket};
use crate::units::{Price, PricePerQuantity, Quantity};
use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The default number of households in a random market
pub const DEFAULT_HOUSEHOLDS: usize = 64;
/// The default number of landlords in a random market
pub const DEFAULT_LANDLORDS: usize = 48;
/// The default number of households in a random fixed-supply market
pub const DEFAULT_FIXED_SUPPLY_HOUSEHOLDS: usize = 72;
/// The default number of apartments in a fixed-supply market
pub const DEFAULT_SUPPLY_CAPACITY: Quantity = Quantity(48.0);
/// The seed used by the bundled example models
pub const DEFAULT_SEED: u64 = 1234;

const HOUSEHOLD_WEIGHTS: [f64; 3] = [2.1, 1.0, 0.8];
const HOUSEHOLD_BIAS: f64 = -0.35;
const LANDLORD_WEIGHTS: [f64; 3] = [0.9, 1.35, -0.9];
const LANDLORD_BIAS: f64 = 0.55;

/// A household looking for an apartment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Household {
    /// Annual income
    pub income: f64,
    /// How much the household dislikes the commute, between 0 and 1
    pub commute_penalty: f64,
    /// How much space the household needs, relative to a typical household
    pub size_need: f64,
}

impl Default for Household {
    fn default() -> Self {
        Self {
            income: 45_000.0,
            commute_penalty: 0.4,
            size_need: 1.0,
        }
    }
}

impl Household {
    /// A household with randomly drawn characteristics
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            income: rng.random_range(22_000.0..110_000.0),
            commute_penalty: rng.random_range(0.05..0.85),
            size_need: rng.random_range(0.7..1.5),
        }
    }

    /// The features fed to the household preference model
    pub fn features(&self) -> Vec<f64> {
        vec![
            self.income / 100_000.0,
            1.0 - self.commute_penalty,
            self.size_need,
        ]
    }

    /// Create a buying agent for this household
    pub fn into_agent(self, id: &str, quantity: Quantity) -> Result<Agent> {
        Agent::new(
            id.into(),
            Side::Buy,
            quantity,
            Some(self.features()),
            Box::new(LinearPreferenceModel::new(
                HOUSEHOLD_WEIGHTS.to_vec(),
                HOUSEHOLD_BIAS,
            )),
        )
    }
}

/// A landlord with an apartment to let
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landlord {
    /// The quality of the unit, between 0 and 1
    pub unit_quality: f64,
    /// The cost of maintaining the unit
    pub maintenance_cost: f64,
    /// The risk of the unit standing empty, between 0 and 1
    pub vacancy_risk: f64,
}

impl Default for Landlord {
    fn default() -> Self {
        Self {
            unit_quality: 0.6,
            maintenance_cost: 0.35,
            vacancy_risk: 0.15,
        }
    }
}

impl Landlord {
    /// A landlord with randomly drawn characteristics
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            unit_quality: rng.random_range(0.45..0.95),
            maintenance_cost: rng.random_range(0.22..0.6),
            vacancy_risk: rng.random_range(0.04..0.3),
        }
    }

    /// The features fed to the landlord preference model
    pub fn features(&self) -> Vec<f64> {
        vec![self.unit_quality, self.maintenance_cost, self.vacancy_risk]
    }

    /// Create a selling agent for this landlord
    pub fn into_agent(self, id: &str, quantity: Quantity) -> Result<Agent> {
        Agent::new(
            id.into(),
            Side::Sell,
            quantity,
            Some(self.features()),
            Box::new(LinearPreferenceModel::new(
                LANDLORD_WEIGHTS.to_vec(),
                LANDLORD_BIAS,
            )),
        )
    }
}

/// Create a random number generator, seeded from the OS if no seed is given
fn new_rng(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64)
}

/// Create `count` households with random characteristics and IDs `hh-0`, `hh-1`, ...
fn random_households<R: Rng>(rng: &mut R, count: usize) -> Result<Vec<Box<dyn AgentResponse>>> {
    (0..count)
        .map(|idx| {
            let agent = Household::random(rng).into_agent(&format!("hh-{idx}"), Quantity(1.0))?;
            Ok(Box::new(agent) as Box<dyn AgentResponse>)
        })
        .collect()
}

/// Create a market of randomly generated households and landlords.
///
/// Households are generated first, then landlords, from the same random number generator, so a
/// given seed always produces the same market.
pub fn apartment_market(
    households: usize,
    landlords: usize,
    seed: Option<u64>,
) -> Result<VariableSupplyMarket> {
    let mut rng = new_rng(seed);
    let mut agents = random_households(&mut rng, households)?;
    for idx in 0..landlords {
        let agent = Landlord::random(&mut rng).into_agent(&format!("ll-{idx}"), Quantity(1.0))?;
        agents.push(Box::new(agent));
    }

    VariableSupplyMarket::from_agents(agents)
}

/// Create a market of randomly generated households competing for a fixed number of apartments
pub fn fixed_supply_apartment_market(
    capacity: Quantity,
    households: usize,
    seed: Option<u64>,
) -> Result<FixedSupplyMarket> {
    let mut rng = new_rng(seed);
    let mut market = FixedSupplyMarket::new(capacity)?;
    for agent in random_households(&mut rng, households)? {
        market.add_agent(agent)?;
    }

    Ok(market)
}

/// The config used for apartment markets, with the named options replaced
pub fn apartment_simulation_config(overrides: &toml::Table) -> Result<SimulationConfig> {
    let config = SimulationConfig {
        price_init: Price(1.8),
        max_steps: 220,
        excess_tolerance: Quantity(5e-3),
        adjustment_rate: PricePerQuantity(0.08),
        price_bounds: (Price(0.35), Price(5.0)),
        curve_sampling: CurveSamplingConfig {
            price_min: Price(0.35),
            price_max: Price(5.0),
            points: 120,
            ..CurveSamplingConfig::default()
        },
        ..SimulationConfig::default()
    };

    config.with_overrides(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MarketState;
    use crate::fixture::assert_error;
    use crate::market::Market;
    use crate::simulation::{Simulation, SimulationEvent};
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_household_reservation_price() {
        let agent = Household::default()
            .into_agent("hh", Quantity(1.0))
            .unwrap();
        let price = Price(1.0);
        let state = MarketState::at_price(Some(0), &price);

        // 2.1 * 0.45 + 1.0 * 0.6 + 0.8 * 1.0 - 0.35
        assert_approx_eq!(
            Price,
            agent.reservation_price(&state),
            Price(1.995),
            epsilon = 1e-12
        );
        assert_eq!(agent.quantity_at_price(price, &state), Quantity(1.0));
    }

    #[test]
    fn test_landlord_reservation_price() {
        let agent = Landlord::default()
            .into_agent("ll", Quantity(1.0))
            .unwrap();
        let price = Price(1.0);
        let state = MarketState::at_price(Some(0), &price);

        // 0.9 * 0.6 + 1.35 * 0.35 - 0.9 * 0.15 + 0.55
        assert_approx_eq!(
            Price,
            agent.reservation_price(&state),
            Price(1.4275),
            epsilon = 1e-12
        );
        assert_eq!(agent.quantity_at_price(price, &state), Quantity(0.0));
    }

    #[test]
    fn test_apartment_market_is_reproducible() {
        let a = apartment_market(10, 8, Some(DEFAULT_SEED)).unwrap();
        let b = apartment_market(10, 8, Some(DEFAULT_SEED)).unwrap();
        assert_eq!(a.buyers().len(), 10);
        assert_eq!(a.sellers().len(), 8);
        assert!(a.buyers().contains_key("hh-9"));
        assert!(a.sellers().contains_key("ll-0"));

        for price in [Price(0.5), Price(1.5), Price(3.0)] {
            let state = MarketState::at_price(Some(0), &price);
            assert_eq!(
                a.excess_demand(price, &state),
                b.excess_demand(price, &state)
            );
        }
    }

    #[test]
    fn test_fixed_supply_apartment_market() {
        let market = fixed_supply_apartment_market(
            DEFAULT_SUPPLY_CAPACITY,
            DEFAULT_FIXED_SUPPLY_HOUSEHOLDS,
            Some(DEFAULT_SEED),
        )
        .unwrap();
        assert_eq!(market.buyers().len(), DEFAULT_FIXED_SUPPLY_HOUSEHOLDS);
        assert!(market.sellers().is_empty());
        assert_eq!(market.capacity(), DEFAULT_SUPPLY_CAPACITY);
    }

    #[test]
    fn test_apartment_simulation_config() {
        let config = apartment_simulation_config(&toml::Table::new()).unwrap();
        assert_eq!(config.price_init, Price(1.8));
        assert_eq!(config.max_steps, 220);
        assert_eq!(config.curve_sampling.points, 120);
        assert!(!config.log_trades);

        let overrides: toml::Table = toml::from_str("log_trades = true").unwrap();
        assert!(apartment_simulation_config(&overrides).unwrap().log_trades);

        let overrides: toml::Table = toml::from_str("random_seed = 1").unwrap();
        assert_error!(
            apartment_simulation_config(&overrides),
            "Unknown simulation option 'random_seed'"
        );
    }

    #[test]
    fn test_apartment_simulation_runs() {
        let market = apartment_market(
            DEFAULT_HOUSEHOLDS,
            DEFAULT_LANDLORDS,
            Some(DEFAULT_SEED),
        )
        .unwrap();
        let config = apartment_simulation_config(&toml::Table::new()).unwrap();
        let mut events = Vec::new();
        let result = Simulation::new(&market, config)
            .unwrap()
            .run_with_sink(&mut events)
            .unwrap();

        // Curves are sampled and checked against the scalar path before the run
        let curves = result.history.curves.as_ref().unwrap();
        assert_eq!(curves.len(), 120);
        assert!(matches!(
            events.first(),
            Some(SimulationEvent::CurvesSampled { points: 120 })
        ));
        assert!(!result.history.observations.is_empty());
        assert!(result.history.observations.len() <= 221);
    }
}
