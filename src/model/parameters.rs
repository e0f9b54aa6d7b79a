//! Defines the [`ModelParameters`] struct, which represents the contents of `model.toml`.
use crate::apartment::DEFAULT_SUPPLY_CAPACITY;
use crate::config::SimulationConfig;
use crate::input::{input_err_msg, read_toml};
use crate::units::Quantity;
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::Path;

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

/// Represents the contents of the entire model file.
#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ModelParameters {
    /// Parameters for the simulation run
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// The kind of market to simulate
    #[serde(default)]
    pub market: MarketParameters,
    /// A randomly generated population of agents, added to any listed in `agents.csv`
    pub population: Option<PopulationParameters>,
}

/// Represents the `[market]` table of the model file
#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct MarketParameters {
    /// Where supply comes from
    #[serde(default)]
    pub kind: MarketKind,
    /// The exogenous supply capacity (fixed-supply markets only). May be omitted if there is a
    /// population, which provides a default.
    pub supply_capacity: Option<Quantity>,
}

/// The kinds of market which can be simulated
#[derive(DeserializeLabeledStringEnum, Debug, PartialEq, Eq, Default, Clone, Copy)]
pub enum MarketKind {
    /// Supply comes from seller agents
    #[default]
    #[string = "variable_supply"]
    VariableSupply,
    /// Supply is a fixed capacity and sellers only take part in settlement
    #[string = "fixed_supply"]
    FixedSupply,
}

/// Represents the `[population]` table of the model file
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PopulationParameters {
    /// The kind of population to generate
    pub kind: PopulationKind,
    /// The number of households (buyers)
    pub households: Option<usize>,
    /// The number of landlords (sellers)
    pub landlords: Option<usize>,
    /// Seed for the random number generator. If omitted, a different population is generated on
    /// each run.
    pub seed: Option<u64>,
}

/// The kinds of population which can be generated
#[derive(DeserializeLabeledStringEnum, Debug, PartialEq, Eq, Clone, Copy)]
pub enum PopulationKind {
    /// Households renting apartments from landlords
    #[string = "apartment"]
    Apartment,
}

/// Check that the `[market]` table is valid
fn check_market(
    market: &MarketParameters,
    population: Option<&PopulationParameters>,
) -> Result<()> {
    match market.kind {
        MarketKind::VariableSupply => ensure!(
            market.supply_capacity.is_none(),
            "supply_capacity can only be given for fixed_supply markets"
        ),
        MarketKind::FixedSupply => ensure!(
            market.supply_capacity.is_some() || population.is_some(),
            "supply_capacity must be given for fixed_supply markets without a population"
        ),
    }

    Ok(())
}

/// Check that the `[population]` table is valid for the given kind of market
fn check_population(population: &PopulationParameters, market_kind: MarketKind) -> Result<()> {
    ensure!(
        market_kind != MarketKind::FixedSupply || population.landlords.is_none(),
        "landlords cannot be given for fixed_supply markets, whose populations only contain households"
    );

    Ok(())
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// The supply capacity of a fixed-supply market, falling back on the population's default
    pub fn supply_capacity(&self) -> Option<Quantity> {
        self.market.supply_capacity.or_else(|| {
            self.population.as_ref().map(|population| match population.kind {
                PopulationKind::Apartment => DEFAULT_SUPPLY_CAPACITY,
            })
        })
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        // simulation
        self.simulation
            .validate()
            .context("Invalid [simulation] table")?;

        // market
        check_market(&self.market, self.population.as_ref())?;

        // population
        if let Some(population) = &self.population {
            check_population(population, self.market.kind)?;
        }

        Ok(())
    }
}
