//! Common routines for handling input data.
use anyhow::{Context, Result};
use serde::de::{Deserialize, DeserializeOwned, Deserializer, Error};
use std::fs;
use std::path::Path;

pub mod agent;
pub use agent::read_agents;

/// Read a series of type `T`s from a CSV file, returning an empty `Vec` if the file is missing.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv_optional<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    if !file_path.exists() {
        return Ok(Vec::new());
    }

    read_csv_internal(file_path)
}

fn read_csv_internal<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let vec = csv::Reader::from_path(file_path)
        .with_context(|| input_err_msg(file_path))?
        .into_deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| input_err_msg(file_path))?;

    Ok(vec)
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;

    Ok(toml_data)
}

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Read a list of numbers separated by semicolons, e.g. `0.5;1.2;-3`.
///
/// An empty string gives an empty list.
pub fn deserialise_number_list<'de, D>(deserialiser: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: String = Deserialize::deserialize(deserialiser)?;
    value
        .split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse()
                .map_err(|_| D::Error::custom(format!("Invalid number in list: '{item}'")))
        })
        .collect()
}
