use crate::commandline::{default_device_name, CliArgs};
use anyhow::{Context, Result};
use serde::Deserialize;
use spectra_x_lib::barrier::DEFAULT_TIMEOUT;
use spectra_x_lib::registry::FilterOptions;
use spectra_x_lib::transport::BAUD_RATE;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "spectrax.yml";

/// Contents of the YAML configuration file. Every key is optional.
///
/// ```yaml
/// device: /dev/ttyUSB0
/// timeout: 250ms
/// names: [395/25, 440/20, 470/24, 510/25, 550/15, 640/30]
/// filters:
///   yellow_filter: true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub device: Option<String>,
    pub baud_rate: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub names: Option<Vec<String>>,
    pub filters: FilterOptions,
}

/// Connection settings after merging the command line over the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub device: String,
    pub baud_rate: u32,
    pub timeout: Duration,
    pub names: Option<Vec<String>>,
    pub filters: FilterOptions,
}

impl Settings {
    /// Command line values win; flags can only switch a filter option on.
    pub fn resolve(args: &CliArgs, config: Config) -> Self {
        Self {
            device: args
                .device
                .clone()
                .or(config.device)
                .unwrap_or_else(default_device_name),
            baud_rate: args.baud_rate.or(config.baud_rate).unwrap_or(BAUD_RATE),
            timeout: args.timeout.or(config.timeout).unwrap_or(DEFAULT_TIMEOUT),
            names: args.names.clone().or(config.names),
            filters: FilterOptions {
                yellow_filter: args.yellow_filter || config.filters.yellow_filter,
                teal_to_nir: args.teal_to_nir || config.filters.teal_to_nir,
                red_to_nir: args.red_to_nir || config.filters.red_to_nir,
            },
        }
    }
}

/// Loads the config file given on the command line, or the default file if it exists.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default_file = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default_file.exists() {
                log::debug!("No config file found, using defaults");
                return Ok(Config::default());
            }
            default_file
        }
    };
    log::debug!("Loading config file from {:?}", &path);
    let config_file =
        File::open(&path).with_context(|| format!("Cannot open config file {path:?}"))?;
    let config: Config = serde_yaml::from_reader(&config_file)
        .with_context(|| format!("Cannot parse config file {path:?}"))?;
    Ok(config)
}
