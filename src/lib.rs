//! Tâtonnement price discovery for markets of buyer and seller agents.
//!
//! A [`Simulation`](simulation::Simulation) repeatedly evaluates excess demand in a
//! [`Market`](market::Market), narrowing a bracket around the market-clearing price by bisection
//! and falling back to proportional price adjustment when no valid bracket exists.
#![warn(missing_docs)]
use anyhow::{Context, Result};
use std::path::PathBuf;

pub mod agent;
pub mod apartment;
pub mod cli;
pub mod config;
pub mod id;
pub mod input;
pub mod log;
pub mod market;
pub mod model;
pub mod output;
pub mod settings;
pub mod simulation;
pub mod units;

#[cfg(test)]
mod fixture;

/// Get the path to the program's directory in the user's config folder
pub fn get_tatonnement_config_dir() -> Result<PathBuf> {
    let mut config_dir = dirs::config_dir().context("Could not determine user config directory")?;
    config_dir.push("tatonnement");

    Ok(config_dir)
}
