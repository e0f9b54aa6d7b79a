//! The module responsible for writing output data to disk.
use crate::agent::Side;
use crate::config::SimulationConfig;
use crate::id::AgentID;
use crate::market::{CurveData, TradeRecord};
use crate::simulation::{MarketObservation, SimulationResult};
use crate::units::{Price, Quantity};
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;
pub use metadata::write_metadata;

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "tatonnement_results";

/// The output file name for the price trajectory
const TRAJECTORY_FILE_NAME: &str = "trajectory.csv";

/// The output file name for sampled demand and supply curves
const CURVES_FILE_NAME: &str = "curves.csv";

/// The output file name for trades
const TRADES_FILE_NAME: &str = "trades.csv";

/// The output file name for the agents participating in each trade
const TRADE_PARTICIPANTS_FILE_NAME: &str = "debug_trade_participants.csv";

/// Get the model name from the specified directory path
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Get the model name from the dir path. This ends up being convoluted because we need to check
    // for all possible errors. Ugh.
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    // Construct path
    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory for the model, optionally overwriting existing data.
///
/// # Arguments
///
/// * `output_dir` - The output directory to create/overwrite
/// * `allow_overwrite` - Whether to delete and recreate the folder if it is non-empty
///
/// # Returns
///
/// True if the output dir contained existing data that was deleted, false if not, or an error.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    // If the folder already exists, then delete it
    let overwrite = if let Ok(mut it) = fs::read_dir(output_dir) {
        if it.next().is_none() {
            // Folder exists and is empty: nothing to do
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Please delete the folder or pass the \
            --overwrite command-line option."
        );

        fs::remove_dir_all(output_dir).context("Could not delete folder")?;
        true
    } else {
        false
    };

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Represents a row in the trajectory CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct TrajectoryRow {
    step: u32,
    price: Price,
    demand: Quantity,
    supply: Quantity,
    excess: Quantity,
}

impl From<&MarketObservation> for TrajectoryRow {
    fn from(observation: &MarketObservation) -> Self {
        Self {
            step: observation.step,
            price: observation.price,
            demand: observation.demand,
            supply: observation.supply,
            excess: observation.excess,
        }
    }
}

/// Represents a row in the curves CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct CurveRow {
    price: Price,
    demand: Quantity,
    supply: Quantity,
}

/// Represents a row in the trades CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct TradeRow {
    step: u32,
    price: Price,
    quantity: Quantity,
    willing_demand: Quantity,
    willing_supply: Quantity,
}

impl From<&TradeRecord> for TradeRow {
    fn from(trade: &TradeRecord) -> Self {
        Self {
            step: trade.step,
            price: trade.price,
            quantity: trade.quantity,
            willing_demand: trade.willing_demand,
            willing_supply: trade.willing_supply,
        }
    }
}

/// Represents a row in the trade participants CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct TradeParticipantRow {
    step: u32,
    side: Side,
    agent_id: AgentID,
}

/// For writing extra debug information about the model
struct DebugDataWriter {
    participants_writer: csv::Writer<File>,
}

impl DebugDataWriter {
    /// Open CSV files to write debug info to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    fn create(output_path: &Path) -> Result<Self> {
        let file_path = output_path.join(TRADE_PARTICIPANTS_FILE_NAME);

        Ok(Self {
            participants_writer: csv::Writer::from_path(file_path)?,
        })
    }

    /// Write the IDs of the agents which took part in each trade
    fn write_trade_participants<'a, I>(&mut self, trades: I) -> Result<()>
    where
        I: Iterator<Item = &'a TradeRecord>,
    {
        for trade in trades {
            let buyers = trade.buyer_ids.iter().map(|id| (Side::Buy, id));
            let sellers = trade.seller_ids.iter().map(|id| (Side::Sell, id));
            for (side, agent_id) in buyers.chain(sellers) {
                self.participants_writer.serialize(TradeParticipantRow {
                    step: trade.step,
                    side,
                    agent_id: agent_id.clone(),
                })?;
            }
        }

        Ok(())
    }

    /// Flush the underlying streams
    fn flush(&mut self) -> Result<()> {
        self.participants_writer.flush()?;

        Ok(())
    }
}

/// An object for writing the results of a simulation run to file
pub struct DataWriter {
    trajectory_writer: csv::Writer<File>,
    curves_writer: Option<csv::Writer<File>>,
    trades_writer: Option<csv::Writer<File>>,
    debug_writer: Option<DebugDataWriter>,
}

impl DataWriter {
    /// Open CSV files to write output data to.
    ///
    /// Files for curves and trades are only created if the config says they will be recorded.
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `config` - The config for the run whose results will be written
    /// * `save_debug_info` - Whether to include extra CSV files for debugging model
    pub fn create(
        output_path: &Path,
        config: &SimulationConfig,
        save_debug_info: bool,
    ) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(file_path)
        };

        let curves_writer = if config.record_state {
            Some(new_writer(CURVES_FILE_NAME)?)
        } else {
            None
        };
        let trades_writer = if config.log_trades {
            Some(new_writer(TRADES_FILE_NAME)?)
        } else {
            None
        };
        let debug_writer = if save_debug_info && config.log_trades {
            // Create debug CSV files
            Some(DebugDataWriter::create(output_path)?)
        } else {
            None
        };

        Ok(Self {
            trajectory_writer: new_writer(TRAJECTORY_FILE_NAME)?,
            curves_writer,
            trades_writer,
            debug_writer,
        })
    }

    /// Write observations to the trajectory CSV file
    pub fn write_trajectory<'a, I>(&mut self, observations: I) -> Result<()>
    where
        I: Iterator<Item = &'a MarketObservation>,
    {
        for observation in observations {
            self.trajectory_writer
                .serialize(TrajectoryRow::from(observation))?;
        }

        Ok(())
    }

    /// Write sampled curves to the curves CSV file, if it was created
    pub fn write_curves(&mut self, curves: &CurveData) -> Result<()> {
        if let Some(wtr) = &mut self.curves_writer {
            for (price, demand, supply) in curves.iter() {
                wtr.serialize(CurveRow {
                    price,
                    demand,
                    supply,
                })?;
            }
        }

        Ok(())
    }

    /// Write trades to the trades CSV file (and participants to the debug file), if created
    pub fn write_trades(&mut self, trades: &[TradeRecord]) -> Result<()> {
        if let Some(wtr) = &mut self.trades_writer {
            for trade in trades {
                wtr.serialize(TradeRow::from(trade))?;
            }
        }

        if let Some(wtr) = &mut self.debug_writer {
            wtr.write_trade_participants(trades.iter())?;
        }

        Ok(())
    }

    /// Write everything recorded during a simulation run
    pub fn write_result(&mut self, result: &SimulationResult) -> Result<()> {
        let history = &result.history;
        self.write_trajectory(history.observations.iter())?;
        if let Some(curves) = &history.curves {
            self.write_curves(curves)?;
        }
        self.write_trades(&history.trades)?;

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.trajectory_writer.flush()?;
        if let Some(wtr) = &mut self.curves_writer {
            wtr.flush()?;
        }
        if let Some(wtr) = &mut self.trades_writer {
            wtr.flush()?;
        }
        if let Some(wtr) = &mut self.debug_writer {
            wtr.flush()?;
        }

        Ok(())
    }
}
