//! Code for writing metadata about a run to file
use crate::simulation::{ConvergenceStatus, SimulationResult};
use crate::units::{Price, Quantity};
use anyhow::{Result, anyhow};
use chrono::prelude::*;
use platform_info::{PlatformInfo, PlatformInfoAPI, UNameAPI};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// The output file name for metadata
const METADATA_FILE_NAME: &str = "metadata.toml";

/// Information about the program build via `built` crate
mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Get information about program version from git
fn get_git_hash() -> String {
    let Some(hash) = built_info::GIT_COMMIT_HASH_SHORT else {
        return "unknown".into();
    };

    if built_info::GIT_DIRTY == Some(true) {
        format!("{hash}-dirty")
    } else {
        hash.into()
    }
}

#[derive(Serialize)]
struct Metadata<'a> {
    run: RunMetadata<'a>,
    result: ResultMetadata,
    program: ProgramMetadata<'a>,
    platform: PlatformMetadata,
}

/// Information about the model run
#[derive(Serialize)]
struct RunMetadata<'a> {
    /// Path to the model which was run
    model_path: &'a Path,
    /// The date and time on which the run started
    datetime: String,
}

impl<'a> RunMetadata<'a> {
    fn new(model_path: &'a Path) -> Self {
        let dt = Local::now();
        Self {
            model_path,
            datetime: dt.to_rfc2822(),
        }
    }
}

/// How the run ended
#[derive(Serialize)]
struct ResultMetadata {
    /// The terminal status of the run
    status: ConvergenceStatus,
    /// The number of market observations made
    observations: usize,
    /// The price at the last observation
    final_price: Option<Price>,
    /// The excess demand at the last observation
    final_excess: Option<Quantity>,
}

impl From<&SimulationResult<'_>> for ResultMetadata {
    fn from(result: &SimulationResult) -> Self {
        let last = result.equilibrium();
        Self {
            status: result.status,
            observations: result.history.observations.len(),
            final_price: last.map(|obs| obs.price),
            final_excess: last.map(|obs| obs.excess),
        }
    }
}

#[derive(Serialize)]
struct ProgramMetadata<'a> {
    /// The program name
    name: &'a str,
    /// The program version as specified in Cargo.toml
    version: &'a str,
    /// The target architecture for the build (e.g. x86_64-unknown-linux-gnu)
    target: &'a str,
    /// Whether it is a debug build
    is_debug: bool,
    /// The version of rustc used to compile the program
    rustc_version: &'a str,
    /// When the program was built
    build_time_utc: &'a str,
    /// The git commit hash for this version of the program (if known)
    git_commit_hash: String,
}

impl Default for ProgramMetadata<'_> {
    fn default() -> Self {
        Self {
            name: built_info::PKG_NAME,
            version: built_info::PKG_VERSION,
            target: built_info::TARGET,
            is_debug: built_info::DEBUG,
            rustc_version: built_info::RUSTC_VERSION,
            build_time_utc: built_info::BUILT_TIME_UTC,
            git_commit_hash: get_git_hash(),
        }
    }
}

/// Information about the platform on which the simulation is running.
///
/// The fields correspond to different data available from the [`PlatformInfo`] struct.
#[derive(Serialize)]
struct PlatformMetadata {
    sysname: String,
    nodename: String,
    release: String,
    version: String,
    machine: String,
    osname: String,
}

impl PlatformMetadata {
    fn new() -> Result<Self> {
        let info =
            PlatformInfo::new().map_err(|err| anyhow!("Unable to determine platform info: {err}"))?;
        Ok(Self {
            sysname: info.sysname().to_string_lossy().into(),
            nodename: info.nodename().to_string_lossy().into(),
            release: info.release().to_string_lossy().into(),
            version: info.version().to_string_lossy().into(),
            machine: info.machine().to_string_lossy().into(),
            osname: info.osname().to_string_lossy().into(),
        })
    }
}

/// Write metadata about a completed run to the specified output path in TOML format
pub fn write_metadata(
    output_path: &Path,
    model_path: &Path,
    result: &SimulationResult,
) -> Result<()> {
    let metadata = Metadata {
        run: RunMetadata::new(model_path),
        result: result.into(),
        program: ProgramMetadata::default(),
        platform: PlatformMetadata::new()?,
    };
    let file_path = output_path.join(METADATA_FILE_NAME);
    fs::write(&file_path, toml::to_string(&metadata)?)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::fixture::simple_market;
    use crate::market::VariableSupplyMarket;
    use crate::simulation::Simulation;
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    fn test_write_metadata(simple_market: VariableSupplyMarket) {
        let config = SimulationConfig {
            price_bounds: (Price(0.5), Price(5.0)),
            ..SimulationConfig::default()
        };
        let result = Simulation::new(&simple_market, config)
            .unwrap()
            .run()
            .unwrap();

        let dir = tempdir().unwrap();
        write_metadata(dir.path(), Path::new("some/model"), &result).unwrap();

        let contents = fs::read_to_string(dir.path().join(METADATA_FILE_NAME)).unwrap();
        let table: toml::Table = toml::from_str(&contents).unwrap();
        assert_eq!(table["run"]["model_path"].as_str(), Some("some/model"));
        assert_eq!(
            table["result"]["status"].as_str(),
            Some("converged_by_tolerance")
        );
        assert_eq!(table["result"]["final_price"].as_float(), Some(2.0));
        assert_eq!(table["program"]["name"].as_str(), Some("tatonnement"));
    }
}
