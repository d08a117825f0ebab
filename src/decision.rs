/*
 *  decision.rs
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

//! Converts successive vehicle snapshots into exactly one of eight display
//! slots. Fixed-priority rules, evaluated top to bottom; the first matching
//! rule wins. Edge-triggered animations (ignition start, front door) and the
//! kneeling sequence keep their state inside [`DecisionEngine`], scoped to
//! one instance rather than process-wide.

use log::{debug, info};
use std::time::{Duration, Instant};

use crate::classify::VehicleSnapshot;

/// How long the ignition-start animation holds the display.
pub const IGNITION_ANIM: Duration = Duration::from_secs(3);
/// How long the front-door animation holds the display.
pub const DOOR_ANIM: Duration = Duration::from_secs(2);

/// The eight mutually exclusive display slots, user-facing numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisplaySlot {
    /// Engine running, no special condition.
    Normal = 1,
    /// Front fog lights on.
    FogFront = 2,
    /// Rear fog light on.
    FogRear = 3,
    /// Front door opening animation.
    FrontDoor = 4,
    /// Both doors open while kneeling, also shown while doors close.
    DoorsKneeling = 5,
    /// Kneeling finished, doors still open.
    AfterKneeling = 6,
    /// Ignition on, engine off.
    IgnitionNoEngine = 7,
    /// Ignition just switched on.
    IgnitionStart = 8,
}

impl DisplaySlot {
    /// User-facing slot number (1-8).
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Wire-level slot index (0-7).
    pub fn wire(self) -> u8 {
        self as u8 - 1
    }
}

/// Edge-relevant fields of the previous snapshot. `both_doors` is captured
/// as a combined flag because the door-closing rule keys on its falling
/// edge, not on the individual doors.
#[derive(Debug, Clone, Copy)]
struct PrevEdges {
    ignition: bool,
    front_door: bool,
    #[allow(dead_code)] // retained for parity with the snapshot history model
    kneeling: bool,
    both_doors: bool,
}

impl PrevEdges {
    fn capture(snap: &VehicleSnapshot) -> Self {
        PrevEdges {
            ignition: snap.ignition_on,
            front_door: snap.front_door_open,
            kneeling: snap.kneeling,
            both_doors: snap.both_doors_open(),
        }
    }
}

/// The display decision state machine. One instance per device; owned by the
/// control loop and fed one snapshot per tick together with the tick's wall
/// clock.
#[derive(Debug)]
pub struct DecisionEngine {
    ignition_anim_until: Option<Instant>,
    door_anim_until: Option<Instant>,
    kneeling_sequence_active: bool,
    kneeling_complete_at: Option<Instant>,
    prev: Option<PrevEdges>,
}

impl DecisionEngine {
    pub fn new() -> Self {
        DecisionEngine {
            ignition_anim_until: None,
            door_anim_until: None,
            kneeling_sequence_active: false,
            kneeling_complete_at: None,
            prev: None,
        }
    }

    /// Evaluates one snapshot and returns the slot to display. The very
    /// first snapshot is treated as edge-free, so a vehicle that is already
    /// running at startup does not trigger animations.
    pub fn evaluate(&mut self, snap: &VehicleSnapshot, now: Instant) -> DisplaySlot {
        let prev = self.prev.unwrap_or_else(|| PrevEdges::capture(snap));
        let slot = self.decide(snap, &prev, now);
        self.prev = Some(PrevEdges::capture(snap));
        slot
    }

    fn decide(&mut self, snap: &VehicleSnapshot, prev: &PrevEdges, now: Instant) -> DisplaySlot {
        // Rule 1: ignition rising edge arms a 3 s window that overrides
        // everything else.
        if snap.ignition_on && !prev.ignition {
            self.ignition_anim_until = Some(now + IGNITION_ANIM);
            info!("Ignition on, playing start animation");
        }
        if let Some(until) = self.ignition_anim_until {
            if now < until {
                return DisplaySlot::IgnitionStart;
            }
            self.ignition_anim_until = None;
            debug!("Ignition animation finished");
        }

        // Rule 2: ignition on, engine off.
        if snap.ignition_on && !snap.engine_running {
            return DisplaySlot::IgnitionNoEngine;
        }

        // Rule 3: front-door rising edge arms a 2 s window, shown only while
        // the door stays open.
        if snap.front_door_open && !prev.front_door {
            self.door_anim_until = Some(now + DOOR_ANIM);
            info!("Front door opening");
        }
        if let Some(until) = self.door_anim_until {
            if now >= until {
                self.door_anim_until = None;
            } else if snap.front_door_open {
                return DisplaySlot::FrontDoor;
            }
        }

        let both_doors = snap.both_doors_open();

        // Rule 4: both doors open while kneeling.
        if both_doors && snap.kneeling {
            if !self.kneeling_sequence_active {
                self.kneeling_sequence_active = true;
                info!("Both doors open, bus kneeling");
            }
            return DisplaySlot::DoorsKneeling;
        }

        // Rule 5: kneeling finished, doors still open. The timestamp is a
        // latch against duplicate transition notices, not a timer.
        if self.kneeling_sequence_active && !snap.kneeling && both_doors {
            if self.kneeling_complete_at.is_none() {
                self.kneeling_complete_at = Some(now);
                info!("Kneeling complete");
            }
            return DisplaySlot::AfterKneeling;
        }

        // Rule 6: doors closing while the sequence is active. With every
        // door shut the sequence ends and evaluation falls through; with one
        // door still open the closing image stays up.
        if self.kneeling_sequence_active && !both_doors {
            if prev.both_doors {
                debug!("Doors closing");
                self.kneeling_complete_at = None;
            }
            if !snap.front_door_open && !snap.rear_door_open {
                self.kneeling_sequence_active = false;
                debug!("Doors closed, kneeling sequence over");
            } else {
                return DisplaySlot::DoorsKneeling;
            }
        }

        // Rules 7/8: ambient lighting, then the default.
        if snap.fog_front_on {
            return DisplaySlot::FogFront;
        }
        if snap.fog_rear_on {
            return DisplaySlot::FogRear;
        }
        DisplaySlot::Normal
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap() -> VehicleSnapshot {
        VehicleSnapshot {
            engine_running: true,
            ignition_on: true,
            connected: true,
            ..Default::default()
        }
    }

    fn at(t0: Instant, secs: f32) -> Instant {
        t0 + Duration::from_secs_f32(secs)
    }

    #[test]
    fn slot_numbering_round_trip() {
        assert_eq!(DisplaySlot::Normal.number(), 1);
        assert_eq!(DisplaySlot::Normal.wire(), 0);
        assert_eq!(DisplaySlot::IgnitionStart.number(), 8);
        assert_eq!(DisplaySlot::IgnitionStart.wire(), 7);
    }

    #[test]
    fn default_slot_when_nothing_special() {
        let mut engine = DecisionEngine::new();
        assert_eq!(engine.evaluate(&snap(), Instant::now()), DisplaySlot::Normal);
    }

    #[test]
    fn first_snapshot_is_edge_free() {
        // Ignition already on at startup: no animation, straight to the
        // slot the steady state calls for.
        let mut engine = DecisionEngine::new();
        let s = VehicleSnapshot {
            ignition_on: true,
            engine_running: false,
            ..Default::default()
        };
        assert_eq!(
            engine.evaluate(&s, Instant::now()),
            DisplaySlot::IgnitionNoEngine
        );
    }

    #[test]
    fn ignition_rising_edge_holds_slot_8_for_three_seconds() {
        let mut engine = DecisionEngine::new();
        let t0 = Instant::now();

        let off = VehicleSnapshot::default();
        engine.evaluate(&off, t0);

        // Rising edge with every competing signal asserted: animation wins.
        let mut on = snap();
        on.engine_running = false;
        on.fog_front_on = true;
        on.front_door_open = true;
        on.rear_door_open = true;
        on.kneeling = true;
        assert_eq!(engine.evaluate(&on, at(t0, 0.1)), DisplaySlot::IgnitionStart);
        assert_eq!(engine.evaluate(&on, at(t0, 1.5)), DisplaySlot::IgnitionStart);
        assert_eq!(engine.evaluate(&on, at(t0, 2.9)), DisplaySlot::IgnitionStart);

        // Past the window the next rule (engine off) takes over.
        assert_eq!(
            engine.evaluate(&on, at(t0, 3.2)),
            DisplaySlot::IgnitionNoEngine
        );
    }

    #[test]
    fn ignition_on_engine_off_is_slot_7() {
        let mut engine = DecisionEngine::new();
        let t0 = Instant::now();
        engine.evaluate(&VehicleSnapshot::default(), t0);

        let mut s = snap();
        s.engine_running = false;
        engine.evaluate(&s, at(t0, 0.1)); // consumes the ignition animation start
        assert_eq!(
            engine.evaluate(&s, at(t0, 3.5)),
            DisplaySlot::IgnitionNoEngine
        );
    }

    #[test]
    fn door_animation_two_seconds_then_falls_through() {
        let mut engine = DecisionEngine::new();
        let t0 = Instant::now();
        engine.evaluate(&snap(), t0);

        let mut s = snap();
        s.front_door_open = true;
        assert_eq!(engine.evaluate(&s, at(t0, 0.1)), DisplaySlot::FrontDoor);
        assert_eq!(engine.evaluate(&s, at(t0, 1.9)), DisplaySlot::FrontDoor);
        // Window elapsed, door still open, no other rule applies.
        assert_eq!(engine.evaluate(&s, at(t0, 2.3)), DisplaySlot::Normal);
    }

    #[test]
    fn door_animation_falls_through_to_fog() {
        let mut engine = DecisionEngine::new();
        let t0 = Instant::now();
        engine.evaluate(&snap(), t0);

        let mut s = snap();
        s.front_door_open = true;
        s.fog_rear_on = true;
        assert_eq!(engine.evaluate(&s, at(t0, 0.1)), DisplaySlot::FrontDoor);
        assert_eq!(engine.evaluate(&s, at(t0, 2.5)), DisplaySlot::FogRear);
    }

    #[test]
    fn kneeling_sequence_full_cycle() {
        let mut engine = DecisionEngine::new();
        let t0 = Instant::now();
        engine.evaluate(&snap(), t0);

        // Both doors open + kneeling: slot 5.
        let mut s = snap();
        s.front_door_open = true;
        s.rear_door_open = true;
        s.kneeling = true;
        // Door animation window is live for the front door edge; skip past it.
        engine.evaluate(&s, at(t0, 0.1));
        assert_eq!(engine.evaluate(&s, at(t0, 2.5)), DisplaySlot::DoorsKneeling);
        // Idempotent while the state holds.
        assert_eq!(engine.evaluate(&s, at(t0, 2.6)), DisplaySlot::DoorsKneeling);

        // Kneeling ends, doors still open: slot 6, and it persists.
        s.kneeling = false;
        assert_eq!(engine.evaluate(&s, at(t0, 3.0)), DisplaySlot::AfterKneeling);
        assert_eq!(engine.evaluate(&s, at(t0, 3.5)), DisplaySlot::AfterKneeling);

        // One door closes: slot 5 while the other stays open.
        s.front_door_open = false;
        assert_eq!(engine.evaluate(&s, at(t0, 4.0)), DisplaySlot::DoorsKneeling);
        assert_eq!(engine.evaluate(&s, at(t0, 4.2)), DisplaySlot::DoorsKneeling);

        // Both closed: sequence over, back to normal.
        s.rear_door_open = false;
        assert_eq!(engine.evaluate(&s, at(t0, 4.5)), DisplaySlot::Normal);
        assert_eq!(engine.evaluate(&s, at(t0, 4.6)), DisplaySlot::Normal);
    }

    #[test]
    fn kneeling_reentry_after_doors_reopen() {
        let mut engine = DecisionEngine::new();
        let t0 = Instant::now();
        engine.evaluate(&snap(), t0);

        let mut s = snap();
        s.front_door_open = true;
        s.rear_door_open = true;
        s.kneeling = true;
        engine.evaluate(&s, at(t0, 0.1));
        engine.evaluate(&s, at(t0, 2.5));

        // Sequence completes and the bus raises again while doors close.
        s.kneeling = false;
        engine.evaluate(&s, at(t0, 3.0));
        s.front_door_open = false;
        s.rear_door_open = false;
        assert_eq!(engine.evaluate(&s, at(t0, 3.5)), DisplaySlot::Normal);

        // A fresh kneeling engagement starts a new sequence.
        s.front_door_open = true;
        s.rear_door_open = true;
        s.kneeling = true;
        engine.evaluate(&s, at(t0, 4.0)); // front door edge animation
        assert_eq!(engine.evaluate(&s, at(t0, 6.5)), DisplaySlot::DoorsKneeling);
    }

    #[test]
    fn fog_priority_front_over_rear() {
        let mut engine = DecisionEngine::new();
        let t0 = Instant::now();
        let mut s = snap();
        s.fog_front_on = true;
        s.fog_rear_on = true;
        assert_eq!(engine.evaluate(&s, t0), DisplaySlot::FogFront);
        s.fog_front_on = false;
        assert_eq!(engine.evaluate(&s, at(t0, 0.1)), DisplaySlot::FogRear);
    }

    #[test]
    fn every_tick_returns_a_valid_slot() {
        // Walk a pseudo-random signal pattern and confirm totality.
        let mut engine = DecisionEngine::new();
        let t0 = Instant::now();
        for i in 0..200u32 {
            let s = VehicleSnapshot {
                ignition_on: i % 3 != 0,
                engine_running: i % 5 != 0,
                fog_front_on: i % 7 == 0,
                fog_rear_on: i % 11 == 0,
                front_door_open: i % 4 == 0,
                rear_door_open: i % 6 == 0,
                kneeling: i % 13 == 0,
                connected: true,
                ..Default::default()
            };
            let slot = engine.evaluate(&s, at(t0, i as f32 * 0.1));
            assert!((1..=8).contains(&slot.number()));
        }
    }
}
