/*
 *  controller.rs
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

//! The control loop: poll telemetry, classify, decide, and push the result
//! to the device. One fixed-cadence tick runs the stages in order; each
//! stage either yields a value or "nothing this tick", and a failed device
//! write never stops the loop.

use log::{debug, error, info, warn};
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};

use crate::classify::{classify, VehicleSnapshot};
use crate::constants::REFRESH_INTERVAL_MS;
use crate::decision::{DecisionEngine, DisplaySlot};
use crate::link::{DeviceLink, Transport};
use crate::telemetry::TelemetryClient;

pub struct Controller<T: Transport> {
    telemetry: TelemetryClient,
    engine: DecisionEngine,
    link: DeviceLink<T>,
    snapshot: VehicleSnapshot,
    /// Last slot actually accepted by the device.
    current_slot: Option<DisplaySlot>,
    last_refresh: Instant,
    poll_interval: Duration,
}

impl<T: Transport> Controller<T> {
    pub fn new(telemetry: TelemetryClient, link: DeviceLink<T>, poll_interval: Duration) -> Self {
        Controller {
            telemetry,
            engine: DecisionEngine::new(),
            link,
            snapshot: VehicleSnapshot::default(),
            current_slot: None,
            last_refresh: Instant::now(),
            poll_interval,
        }
    }

    /// Runs the tick loop until the surrounding `select!` cancels it.
    pub async fn run(&mut self) {
        info!("Control loop started ({:?} cadence)", self.poll_interval);
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Waiting for game connection (enable telemetry in the simulator)");

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One control cycle. Telemetry failure means "no data this tick": the
    /// displayed slot stays as-is and the vehicle id re-resolves on the next
    /// successful poll.
    async fn tick(&mut self) {
        let vars = match self.telemetry.poll().await {
            Ok(v) => v,
            Err(e) => {
                if self.snapshot.connected {
                    warn!("Game connection lost ({}), waiting...", e);
                    self.snapshot.connected = false;
                }
                return;
            }
        };

        if !self.snapshot.connected {
            info!("Connected to game");
        }
        self.snapshot = classify(&vars, &self.snapshot);

        let now = Instant::now();
        let target = self.engine.evaluate(&self.snapshot, now);

        if self.current_slot != Some(target) {
            info!("Switching to image {}", target.number());
            // SHOW is one short command line with no reply; the write lands
            // in the driver's buffer without a multi-second handshake, so it
            // stays on the tick path rather than a blocking task.
            match self
                .link
                .show_slot(target.wire() as usize, self.snapshot.gear, self.snapshot.speed)
            {
                Ok(()) => {
                    self.current_slot = Some(target);
                    self.last_refresh = now;
                }
                Err(e) => error!("Device write failed: {}", e),
            }
        } else if now.duration_since(self.last_refresh) >= Duration::from_millis(REFRESH_INTERVAL_MS)
        {
            // Same image, but the device overlays gear and speed; keep them
            // fresh at a slower cadence.
            if let Some(slot) = self.current_slot {
                debug!(
                    "Refreshing slot {} (gear {}, {} km/h)",
                    slot.number(),
                    self.snapshot.gear,
                    self.snapshot.speed
                );
                if let Err(e) =
                    self.link
                        .show_slot(slot.wire() as usize, self.snapshot.gear, self.snapshot.speed)
                {
                    error!("Device refresh failed: {}", e);
                }
                self.last_refresh = now;
            }
        }
    }
}
