/*
 *  telemetry.rs
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

//! Polls the simulator's HTTP telemetry API for the active vehicle and its
//! variable set. The vehicle identity is resolved lazily and re-resolved
//! whenever the player leaves the vehicle or a request fails.

use log::debug;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Variables requested from the telemetry endpoint on every poll.
const VEHICLE_VARS: &str = "Buttons,AllLamps,IsPlayerControlled,BusLogic,Velocity,Gear,Speed";

/// Error type for telemetry operations. All variants collapse to "no data
/// this tick" at the orchestrator boundary; the distinction only matters
/// for logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    /// No vehicle exists, or the player is not in vehicle mode.
    #[error("no active player vehicle")]
    NoVehicle,
    /// The player left the vehicle; the cached id was invalidated.
    #[error("player no longer controls the vehicle")]
    NotPlayerControlled,
}

/// `GET /player` response.
#[derive(Debug, Deserialize)]
struct PlayerInfo {
    #[serde(rename = "Mode")]
    mode: Option<String>,
    #[serde(rename = "CurrentVehicle")]
    current_vehicle: Option<String>,
}

/// One button record from the vehicle variable set.
#[derive(Debug, Clone, Deserialize)]
pub struct Button {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "State", default)]
    pub state: String,
}

/// The vehicle variable set consumed by the classifier. Lamp values arrive
/// as numbers-as-strings, occasionally as bare numbers; they are kept as raw
/// JSON values and parsed leniently downstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleVars {
    #[serde(rename = "AllLamps", default)]
    pub all_lamps: HashMap<String, Value>,
    #[serde(rename = "Buttons", default)]
    pub buttons: Vec<Button>,
    #[serde(rename = "IsPlayerControlled")]
    pub is_player_controlled: Option<String>,
    #[serde(rename = "Velocity")]
    pub velocity: Option<Value>,
    #[serde(rename = "Speed")]
    pub speed: Option<Value>,
}

/// Client for the simulator telemetry API. Short timeouts keep a stalled
/// server from blocking the control loop for more than about a second.
#[derive(Debug)]
pub struct TelemetryClient {
    client: Client,
    base_url: String,
    current_vehicle: Option<String>,
}

impl TelemetryClient {
    pub fn new(host: &str, port: u16) -> Self {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut headers = header::HeaderMap::new();
        headers.insert("User-Agent", header::HeaderValue::from_static(VERSION));
        headers.insert("Accept", header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .http1_only()
            .connect_timeout(Duration::from_millis(500))
            .default_headers(headers)
            .timeout(Duration::from_millis(1000))
            .build()
            .unwrap(); // Panics if client cannot be built, which is acceptable at initialization

        TelemetryClient {
            client,
            base_url: format!("http://{}:{}", host, port),
            current_vehicle: None,
        }
    }

    /// Resolves the vehicle the player is currently driving, or `None` when
    /// no vehicle exists or the player is on foot.
    async fn resolve_vehicle(&self) -> Result<Option<String>, TelemetryError> {
        let vehicles: Vec<Value> = self
            .client
            .get(format!("{}/vehicles", self.base_url))
            .send()
            .await?
            .json()
            .await?;
        if vehicles.is_empty() {
            return Ok(None);
        }

        let player: PlayerInfo = self
            .client
            .get(format!("{}/player", self.base_url))
            .send()
            .await?
            .json()
            .await?;

        if player.mode.as_deref() == Some("Vehicle") {
            Ok(player.current_vehicle)
        } else {
            Ok(None)
        }
    }

    /// Fetches the current vehicle's variable set. Any failure invalidates
    /// the cached vehicle id so the next poll re-resolves it.
    pub async fn poll(&mut self) -> Result<VehicleVars, TelemetryError> {
        if self.current_vehicle.is_none() {
            match self.resolve_vehicle().await {
                Ok(Some(id)) => {
                    debug!("Resolved player vehicle: {}", id);
                    self.current_vehicle = Some(id);
                }
                Ok(None) => return Err(TelemetryError::NoVehicle),
                Err(e) => return Err(e),
            }
        }

        let id = self.current_vehicle.clone().unwrap_or_default();
        let url = format!("{}/vehicles/{}", self.base_url, id);
        let result = self
            .client
            .get(&url)
            .query(&[("vars", VEHICLE_VARS)])
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                self.current_vehicle = None;
                return Err(e.into());
            }
        };

        let vars: VehicleVars = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                self.current_vehicle = None;
                return Err(e.into());
            }
        };

        if vars.is_player_controlled.as_deref() == Some("false") {
            self.current_vehicle = None;
            return Err(TelemetryError::NotPlayerControlled);
        }

        Ok(vars)
    }
}
