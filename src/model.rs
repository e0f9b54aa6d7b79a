//! Code for loading models: a simulation config plus the market to simulate.
use crate::agent::Agent;
use crate::apartment::{
    DEFAULT_FIXED_SUPPLY_HOUSEHOLDS, DEFAULT_HOUSEHOLDS, DEFAULT_LANDLORDS, apartment_market,
    fixed_supply_apartment_market,
};
use crate::config::SimulationConfig;
use crate::input::read_agents;
use crate::market::{FixedSupplyMarket, Market, VariableSupplyMarket};
use crate::simulation::Simulation;
use anyhow::{Context, Result, ensure};
use std::path::Path;

pub mod parameters;
pub use parameters::{MarketKind, MarketParameters, ModelParameters, PopulationParameters};
use parameters::PopulationKind;

/// A model ready to be simulated
pub struct Model {
    /// The parameters read from the model file
    pub parameters: ModelParameters,
    /// The market to simulate
    pub market: Box<dyn Market>,
}

impl Model {
    /// Read a model from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let parameters = ModelParameters::from_path(model_dir)?;
        let agents = read_agents(model_dir)?;
        let market = build_market(&parameters, agents)?;

        Ok(Self { parameters, market })
    }

    /// The simulation config for this model
    pub fn config(&self) -> &SimulationConfig {
        &self.parameters.simulation
    }

    /// Create a [`Simulation`] of this model
    pub fn simulation(&self) -> Result<Simulation<'_>> {
        Simulation::new(self.market.as_ref(), self.parameters.simulation.clone())
    }
}

/// Build the market described by the model parameters, adding the given agents
fn build_market(parameters: &ModelParameters, agents: Vec<Agent>) -> Result<Box<dyn Market>> {
    let population = parameters.population.as_ref();
    match parameters.market.kind {
        MarketKind::VariableSupply => {
            let mut market = match population {
                Some(population) => match population.kind {
                    PopulationKind::Apartment => apartment_market(
                        population.households.unwrap_or(DEFAULT_HOUSEHOLDS),
                        population.landlords.unwrap_or(DEFAULT_LANDLORDS),
                        population.seed,
                    )?,
                },
                None => VariableSupplyMarket::new(),
            };
            for agent in agents {
                market.add_agent(Box::new(agent))?;
            }
            ensure!(
                !market.buyers().is_empty() || !market.sellers().is_empty(),
                "The model contains no agents"
            );

            Ok(Box::new(market))
        }
        MarketKind::FixedSupply => {
            let capacity = parameters.supply_capacity().context(
                "supply_capacity must be given for fixed_supply markets without a population",
            )?;
            let mut market = match population {
                Some(population) => match population.kind {
                    PopulationKind::Apartment => fixed_supply_apartment_market(
                        capacity,
                        population
                            .households
                            .unwrap_or(DEFAULT_FIXED_SUPPLY_HOUSEHOLDS),
                        population.seed,
                    )?,
                },
                None => FixedSupplyMarket::new(capacity)?,
            };
            for agent in agents {
                market.add_agent(Box::new(agent))?;
            }
            ensure!(
                !market.buyers().is_empty() || !market.sellers().is_empty(),
                "The model contains no agents"
            );

            Ok(Box::new(market))
        }
    }
}
