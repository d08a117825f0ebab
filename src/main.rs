/*
 *  main.rs
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

use anyhow::{bail, Context};
use env_logger::Env;
use log::info;
use std::time::Duration;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

mod classify;
mod config;
mod constants;
mod controller;
mod decision;
mod link;
mod telemetry;

use config::Command;
use controller::Controller;
use link::{DeviceLink, LinkTimings};
use telemetry::TelemetryClient;

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
#[cfg(unix)]
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received. Initiating graceful shutdown.");
    Ok(())
}

/// Opens the device link off the runtime; the connect handshake sleeps for
/// multiple seconds.
async fn open_link(port: String, baudrate: u32) -> anyhow::Result<DeviceLink<link::SerialTransport>> {
    tokio::task::spawn_blocking(move || {
        DeviceLink::open(&port, baudrate, LinkTimings::default())
    })
    .await
    .context("device link task panicked")?
    .context("failed to open serial port")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cfg, command) = config::load()?;

    let filter = cfg.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(filter)).init();

    let Some(port) = cfg.port.clone() else {
        bail!("no serial port configured; pass --port or set it in the config file");
    };
    let baudrate = cfg.baudrate();

    match command {
        Command::Run => {
            let (host, tport) = cfg.telemetry_endpoint()?;
            info!("Telemetry: http://{}:{}", host, tport);

            let telemetry = TelemetryClient::new(&host, tport);
            let link = open_link(port, baudrate).await?;
            let mut controller = Controller::new(
                telemetry,
                link,
                Duration::from_millis(cfg.poll_interval_ms()),
            );

            tokio::select! {
                _ = signal_handler() => {}
                _ = controller.run() => {}
            }
            info!("Control loop stopped");
        }

        Command::Cache { slot, file } => {
            if !(1..=constants::MAX_SLOTS as u8).contains(&slot) {
                bail!("slot must be 1-{}", constants::MAX_SLOTS);
            }
            let payload = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;

            let result = tokio::task::spawn_blocking(move || {
                let mut link = DeviceLink::open(&port, baudrate, LinkTimings::default())?;
                let mut last_decile = 0u8;
                // user slot 1-8 -> wire slot 0-7
                link.cache_image((slot - 1) as usize, &payload, |fraction| {
                    let decile = (fraction * 10.0) as u8;
                    if decile > last_decile {
                        last_decile = decile;
                        info!("Upload {}%", decile * 10);
                    }
                })
            })
            .await
            .context("cache task panicked")?;

            result.with_context(|| format!("caching slot {} failed", slot))?;
            info!("Image {} cached", slot);
        }

        Command::Status => {
            let lines = tokio::task::spawn_blocking(move || {
                let mut link = DeviceLink::open(&port, baudrate, LinkTimings::default())?;
                link.status()
            })
            .await
            .context("status task panicked")??;

            if lines.is_empty() {
                println!("(no response from device)");
            }
            for line in lines {
                println!("{}", line);
            }
        }
    }

    Ok(())
}
