/*
 *  config.rs
 *
 *  busdisplay - bus simulator telemetry display controller
 *  (c) 2024-26 Bus Display Project
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use clap::{Parser, Subcommand, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

use crate::constants::{DEFAULT_BAUDRATE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TELEMETRY};

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration. All fields are Options so CLI values can be
/// layered over the YAML file, which is layered over defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Serial port of the display (e.g. /dev/ttyUSB0, COM3)
    pub port: Option<String>,
    pub baudrate: Option<u32>,
    /// Telemetry endpoint, host:port
    pub telemetry: Option<String>,
    pub poll_interval_ms: Option<u64>,
    /// e.g. "info" | "debug"
    pub log_level: Option<String>,
}

impl Config {
    pub fn baudrate(&self) -> u32 {
        self.baudrate.unwrap_or(DEFAULT_BAUDRATE)
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS)
    }

    /// Splits the telemetry address into host and port. A bare host gets the
    /// simulator's default port.
    pub fn telemetry_endpoint(&self) -> Result<(String, u16), ConfigError> {
        let raw = self.telemetry.as_deref().unwrap_or(DEFAULT_TELEMETRY);
        let (host, port) = match raw.split_once(':') {
            Some((h, p)) => {
                let port = p.parse::<u16>().map_err(|_| {
                    ConfigError::Validation(format!("invalid telemetry port in '{}'", raw))
                })?;
                (h, port)
            }
            None => (raw, 37337),
        };
        if host.is_empty() {
            return Err(ConfigError::Validation(format!(
                "invalid telemetry address '{}'",
                raw
            )));
        }
        Ok((host.to_string(), port))
    }
}

/// CLI arguments. All config fields are Options so we can layer them over
/// the YAML file.
#[derive(Debug, Parser, Clone)]
#[command(name = "busdisplay", about = "Bus simulator telemetry display controller")]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Serial port of the display
    #[arg(long, short = 'p')]
    pub port: Option<String>,
    #[arg(long, short = 'b')]
    pub baudrate: Option<u32>,
    /// Telemetry address, host:port
    #[arg(long, short = 't')]
    pub telemetry: Option<String>,
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the telemetry control loop (default)
    Run,
    /// Upload a raw RGB565 frame into a device slot
    Cache {
        /// Target slot, 1-8
        #[arg(long, short = 's')]
        slot: u8,
        /// Raw 480x320 RGB565 frame file (307200 bytes)
        #[arg(long, short = 'f', value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    /// Query and print device status
    Status,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<(Config, Command), ConfigError> {
    let cli = Cli::parse();

    // 1) defaults (empty; accessors fill in constants)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            merge(&mut cfg, read_yaml(p)?);
        } else {
            return Err(ConfigError::Validation(format!(
                "config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = search_config() {
        merge(&mut cfg, read_yaml(&p)?);
    }

    // 3) CLI overrides
    merge(
        &mut cfg,
        Config {
            port: cli.port,
            baudrate: cli.baudrate,
            telemetry: cli.telemetry,
            poll_interval_ms: cli.poll_interval_ms,
            log_level: cli.log_level,
        },
    );

    validate(&cfg)?;
    Ok((cfg, cli.command.unwrap_or(Command::Run)))
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Well-known config locations, first hit wins.
fn search_config() -> Option<PathBuf> {
    let mut candidates = vec![PathBuf::from("busdisplay.yaml")];
    if let Some(home) = home_dir() {
        candidates.push(home.join(".config/busdisplay/config.yaml"));
    }
    candidates.into_iter().find(|p| p.exists())
}

/// Later (CLI) values win over earlier (YAML) ones.
fn merge(base: &mut Config, over: Config) {
    if over.port.is_some() {
        base.port = over.port;
    }
    if over.baudrate.is_some() {
        base.baudrate = over.baudrate;
    }
    if over.telemetry.is_some() {
        base.telemetry = over.telemetry;
    }
    if over.poll_interval_ms.is_some() {
        base.poll_interval_ms = over.poll_interval_ms;
    }
    if over.log_level.is_some() {
        base.log_level = over.log_level;
    }
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.port.as_deref().is_some_and(str::is_empty) {
        return Err(ConfigError::Validation("serial port must not be empty".into()));
    }
    if cfg.baudrate == Some(0) {
        return Err(ConfigError::Validation("baudrate must be non-zero".into()));
    }
    if cfg.poll_interval_ms == Some(0) {
        return Err(ConfigError::Validation(
            "poll interval must be non-zero".into(),
        ));
    }
    cfg.telemetry_endpoint().map(|_| ())
}
