/*
 *  constants.rs
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

//! Global constants: display frame geometry, wire protocol tokens, and
//! controller defaults shared across modules.

/// The total width of the target display in pixels.
pub const SCREEN_WIDTH: usize = 480;
/// The total height of the target display in pixels.
pub const SCREEN_HEIGHT: usize = 320;
/// Bytes per pixel on the wire (RGB565, little-endian per pixel).
pub const BYTES_PER_PIXEL: usize = 2;
/// Exact size of one cacheable frame. Any other payload length is rejected.
pub const FRAME_SIZE: usize = SCREEN_WIDTH * SCREEN_HEIGHT * BYTES_PER_PIXEL;

/// Number of image slots on the device. User-facing numbering is 1-8,
/// wire-level numbering 0-7.
pub const MAX_SLOTS: usize = 8;

/// Chunk size for frame transfers. The device's serial receive buffer
/// overruns with larger writes at 921600 baud.
pub const CHUNK_SIZE: usize = 4096;

/// Substring the device emits in a line when it accepts a command.
pub const TOKEN_ACK: &str = "ACK";
/// Alternate readiness token emitted after a cold boot.
pub const TOKEN_READY: &str = "Ready";
/// Substring confirming a completed slot upload.
pub const TOKEN_CACHED_OK: &str = "CACHED_OK";

/// Default serial baudrate for the display firmware.
pub const DEFAULT_BAUDRATE: u32 = 921_600;
/// Default telemetry endpoint (host:port) of the simulator.
pub const DEFAULT_TELEMETRY: &str = "192.168.2.216:37337";
/// Default control-loop cadence in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
/// How often the current slot is re-sent with fresh gear/speed data.
pub const REFRESH_INTERVAL_MS: u64 = 500;
