//! Code for reading agents from `agents.csv`.
use super::{deserialise_number_list, input_err_msg, read_csv_optional};
use crate::agent::preference::LinearPreferenceModel;
use crate::agent::{Agent, Side};
use crate::units::Quantity;
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::path::Path;

const AGENTS_FILE_NAME: &str = "agents.csv";

/// An agent as it appears in the agents CSV file
#[derive(Debug, Deserialize, PartialEq)]
struct AgentRaw {
    id: String,
    side: Side,
    quantity: Quantity,
    bias: f64,
    #[serde(deserialize_with = "deserialise_number_list")]
    weights: Vec<f64>,
    #[serde(deserialize_with = "deserialise_number_list")]
    features: Vec<f64>,
}

impl AgentRaw {
    /// Create an [`Agent`] with a linear preference model from this row
    fn into_agent(self) -> Result<Agent> {
        ensure!(
            self.bias.is_finite(),
            "Bias for agent {} must be a finite number",
            self.id
        );

        let weights = (!self.weights.is_empty()).then_some(self.weights);
        let features = (!self.features.is_empty()).then_some(self.features);
        Agent::new(
            self.id.into(),
            self.side,
            self.quantity,
            features,
            Box::new(LinearPreferenceModel {
                weights,
                bias: self.bias,
            }),
        )
    }
}

/// Read agents from the agents CSV file, if present.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// The agents in file order. If there is no agents file, this is empty.
pub fn read_agents(model_dir: &Path) -> Result<Vec<Agent>> {
    let file_path = model_dir.join(AGENTS_FILE_NAME);
    let agents_csv = read_csv_optional(&file_path)?;
    read_agents_from_iter(agents_csv.into_iter()).with_context(|| input_err_msg(&file_path))
}

fn read_agents_from_iter<I>(iter: I) -> Result<Vec<Agent>>
where
    I: Iterator<Item = AgentRaw>,
{
    iter.map(AgentRaw::into_agent).collect()
}
