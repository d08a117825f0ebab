/*
 *  link.rs
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

//! Owns the serial connection to the display and speaks its textual wire
//! protocol: `CACHE:<slot>:<size>` followed by the raw frame, `SHOW` and
//! `STATUS` command lines. Responses are free-form text; only substring
//! token matches are significant. The transport sits behind a trait so the
//! protocol is testable against a scripted device.

use log::{debug, info, warn};
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::constants::{
    CHUNK_SIZE, FRAME_SIZE, MAX_SLOTS, TOKEN_ACK, TOKEN_CACHED_OK, TOKEN_READY,
};

/// Error type for device link operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("not connected")]
    NotConnected,
    #[error("slot {0} out of range (0-{max})", max = MAX_SLOTS - 1)]
    InvalidSlot(usize),
    #[error("payload is {got} bytes, a frame is exactly {expected}")]
    PayloadSize { got: usize, expected: usize },
    #[error("device did not confirm the upload")]
    CacheUnconfirmed,
}

/// Byte stream to the device. Line reads are bounded; `Ok(None)` means the
/// timeout elapsed without a complete line.
pub trait Transport: Send {
    fn send(&mut self, data: &[u8]) -> io::Result<()>;
    fn recv_line(&mut self, timeout: Duration) -> io::Result<Option<String>>;
}

/// Delays and listen windows of the protocol. Production values match the
/// display firmware; tests shrink them to zero.
#[derive(Debug, Clone)]
pub struct LinkTimings {
    /// Settle time after opening the port (the device resets on DTR).
    pub connect_grace: Duration,
    /// How long to listen for the boot greeting.
    pub greeting_window: Duration,
    /// Pause between a command line and reading its responses.
    pub command_settle: Duration,
    /// Listen window for the per-command acknowledgment.
    pub command_ack_window: Duration,
    /// Pause between payload chunks so the receive buffer drains.
    pub chunk_delay: Duration,
    /// Pause after the full payload before listening for completion.
    pub completion_settle: Duration,
    /// Listen window for the upload confirmation.
    pub completion_window: Duration,
}

impl Default for LinkTimings {
    fn default() -> Self {
        LinkTimings {
            connect_grace: Duration::from_secs(2),
            greeting_window: Duration::from_secs(5),
            command_settle: Duration::from_millis(100),
            command_ack_window: Duration::from_secs(2),
            chunk_delay: Duration::from_millis(5),
            completion_settle: Duration::from_millis(500),
            completion_window: Duration::from_secs(5),
        }
    }
}

impl LinkTimings {
    /// All-zero timings for tests against a scripted transport.
    #[cfg(test)]
    pub fn fast() -> Self {
        LinkTimings {
            connect_grace: Duration::ZERO,
            greeting_window: Duration::ZERO,
            command_settle: Duration::ZERO,
            command_ack_window: Duration::ZERO,
            chunk_delay: Duration::ZERO,
            completion_settle: Duration::ZERO,
            completion_window: Duration::ZERO,
        }
    }
}

/// True when any response line contains the token as a substring. The
/// firmware's protocol is free-form text; this predicate is the single place
/// that knows acknowledgments are matched by substring.
pub fn contains_token(lines: &[String], token: &str) -> bool {
    lines.iter().any(|l| l.contains(token))
}

/// Serial byte stream with buffered line assembly.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    pending: Vec<u8>,
}

impl SerialTransport {
    pub fn open(path: &str, baudrate: u32) -> Result<Self, DeviceError> {
        let port = serialport::new(path, baudrate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(Duration::from_millis(50))
            .open()?;
        Ok(SerialTransport {
            port,
            pending: Vec::new(),
        })
    }

    /// Pops one complete line off the pending buffer, lossily decoded and
    /// trimmed. Blank lines are discarded.
    fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)
    }

    fn recv_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            let mut buf = [0u8; 256];
            match self.port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }
    }
}

/// Client-side view of the device: connection state plus which slots hold a
/// verified upload. Slots are never implicitly cleared; the client cannot
/// observe device-side eviction.
pub struct DeviceLink<T: Transport> {
    transport: Option<T>,
    timings: LinkTimings,
    cached: [bool; MAX_SLOTS],
    greeted: bool,
}

impl DeviceLink<SerialTransport> {
    /// Opens the serial port and performs the settle/greeting handshake.
    pub fn open(path: &str, baudrate: u32, timings: LinkTimings) -> Result<Self, DeviceError> {
        let transport = SerialTransport::open(path, baudrate)?;
        info!("Serial connected: {} @ {} baud", path, baudrate);
        Ok(Self::connect(transport, timings))
    }
}

impl<T: Transport> DeviceLink<T> {
    /// Takes ownership of an open transport, waits out the device's reset
    /// grace period and listens for its greeting. A silent device is not
    /// fatal; it may already be initialized.
    pub fn connect(transport: T, timings: LinkTimings) -> Self {
        let mut link = DeviceLink {
            transport: Some(transport),
            timings,
            cached: [false; MAX_SLOTS],
            greeted: false,
        };

        thread::sleep(link.timings.connect_grace);
        let window = link.timings.greeting_window;
        match link.wait_for_token(window, &[TOKEN_ACK, TOKEN_READY]) {
            Ok(true) => {
                link.greeted = true;
                info!("Device ready");
            }
            Ok(false) => warn!("No greeting from device, continuing anyway"),
            Err(e) => warn!("Greeting read failed ({}), continuing anyway", e),
        }
        link
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether the device greeted us at connect time.
    #[allow(dead_code)]
    pub fn greeted(&self) -> bool {
        self.greeted
    }

    /// Whether a verified upload exists in the given wire slot.
    #[allow(dead_code)]
    pub fn slot_cached(&self, slot: usize) -> bool {
        slot < MAX_SLOTS && self.cached[slot]
    }

    /// Closes the transport. Idempotent.
    pub fn disconnect(&mut self) {
        if self.transport.take().is_some() {
            info!("Device disconnected");
        }
        self.greeted = false;
    }

    /// Writes bytes, dropping the connection on transport failure so later
    /// calls fail fast with `NotConnected`.
    fn send(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        let transport = self.transport.as_mut().ok_or(DeviceError::NotConnected)?;
        if let Err(e) = transport.send(data) {
            warn!("Transport write failed: {}", e);
            self.transport = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Collects response lines until the window elapses, logging each.
    fn collect_responses(&mut self, window: Duration) -> Result<Vec<String>, DeviceError> {
        let transport = self.transport.as_mut().ok_or(DeviceError::NotConnected)?;
        let deadline = Instant::now() + window;
        let mut lines = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match transport.recv_line(remaining)? {
                Some(line) => {
                    debug!("device: {}", line);
                    lines.push(line);
                }
                None => return Ok(lines),
            }
        }
    }

    /// Reads lines until one contains any of the tokens or the window
    /// elapses.
    fn wait_for_token(&mut self, window: Duration, tokens: &[&str]) -> Result<bool, DeviceError> {
        let transport = self.transport.as_mut().ok_or(DeviceError::NotConnected)?;
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match transport.recv_line(remaining)? {
                Some(line) => {
                    debug!("device: {}", line);
                    if tokens.iter().any(|t| line.contains(t)) {
                        return Ok(true);
                    }
                }
                None => return Ok(false),
            }
        }
    }

    /// Uploads one frame into a wire slot (0-7). Contract violations fail
    /// before any byte is transmitted. The device's state after a failed
    /// transfer is undefined; recovery is a full retry from the header, so
    /// the slot is only marked cached on a confirmed upload.
    pub fn cache_image(
        &mut self,
        slot: usize,
        payload: &[u8],
        mut progress: impl FnMut(f32),
    ) -> Result<(), DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        if slot >= MAX_SLOTS {
            return Err(DeviceError::InvalidSlot(slot));
        }
        if payload.len() != FRAME_SIZE {
            return Err(DeviceError::PayloadSize {
                got: payload.len(),
                expected: FRAME_SIZE,
            });
        }

        info!("Caching slot {} ({} bytes)", slot, payload.len());
        self.send(format!("CACHE:{}:{}\n", slot, payload.len()).as_bytes())?;

        thread::sleep(self.timings.command_settle);
        let responses = self.collect_responses(self.timings.command_ack_window)?;
        if !contains_token(&responses, TOKEN_ACK) {
            warn!("No ACK for CACHE command, sending payload anyway");
        }

        let mut sent = 0usize;
        for chunk in payload.chunks(CHUNK_SIZE) {
            self.send(chunk)?;
            sent += chunk.len();
            progress(sent as f32 / payload.len() as f32);
            thread::sleep(self.timings.chunk_delay);
        }
        debug!("Payload sent: {} bytes", sent);

        thread::sleep(self.timings.completion_settle);
        let responses = self.collect_responses(self.timings.completion_window)?;
        if contains_token(&responses, TOKEN_CACHED_OK) {
            self.cached[slot] = true;
            info!("Slot {} cached", slot);
            Ok(())
        } else {
            warn!("No {} confirmation for slot {}", TOKEN_CACHED_OK, slot);
            Err(DeviceError::CacheUnconfirmed)
        }
    }

    /// Switches the displayed slot. Fire-and-forget: the firmware sends no
    /// acknowledgment for SHOW, success means the bytes went out.
    pub fn show_slot(&mut self, slot: usize, gear: i8, speed: u32) -> Result<(), DeviceError> {
        if slot >= MAX_SLOTS {
            return Err(DeviceError::InvalidSlot(slot));
        }
        self.send(format!("SHOW:{}:{}:{}\n", slot, gear, speed).as_bytes())
    }

    /// Queries device status. Response lines are free-form and returned
    /// verbatim for display.
    pub fn status(&mut self) -> Result<Vec<String>, DeviceError> {
        self.send(b"STATUS\n")?;
        thread::sleep(self.timings.command_settle);
        self.collect_responses(self.timings.command_ack_window)
    }
}
