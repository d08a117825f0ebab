/*
 *  classify.rs
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

//! Maps the raw lamp table and button list of one telemetry poll into a
//! canonical [`VehicleSnapshot`]. Lamp names vary between vehicle models and
//! locales, so each logical signal carries an ordered list of known aliases;
//! a signal is on when any alias resolves to a value greater than zero.

use serde_json::Value;
use std::collections::HashMap;

use crate::telemetry::VehicleVars;

/// Known lamp names for the ignition signal.
pub const IGNITION_LAMPS: &[&str] = &[
    "LED Ignition",
    "LED Zuendung",
    "Ignition",
    "LED Power",
    "LED_Ignition",
];
/// Known lamp names for the engine-running signal.
pub const ENGINE_LAMPS: &[&str] = &[
    "LED Engine",
    "LED Motor",
    "Engine Running",
    "LED EngineRunning",
    "LED_EngineRunning",
];
/// Known lamp names for the front fog lights.
pub const FOG_FRONT_LAMPS: &[&str] = &[
    "LED FogLight",
    "LED Nebelscheinwerfer",
    "FogLight",
    "LED FogLightFront",
];
/// Known lamp names for the rear fog light.
pub const FOG_REAR_LAMPS: &[&str] = &[
    "LED RearFogLight",
    "LED Nebelschlussleuchte",
    "RearFogLight",
    "LED FogLightRear",
];
/// Known lamp names for the kneeling (chassis lowering) signal.
pub const KNEELING_LAMPS: &[&str] = &[
    "LED Kneeling",
    "LED Absenkung",
    "Kneeling",
    "LED BusKneeling",
];
/// Known lamp names for door 1 (front door).
pub const DOOR1_LAMPS: &[&str] = &["ButtonLight Door 1", "LED Door1", "Door1Open", "LED DoorFront"];
/// Known lamp names for door 2.
pub const DOOR2_LAMPS: &[&str] = &["ButtonLight Door 2", "LED Door2", "Door2Open", "LED DoorRear"];
/// Known lamp names for door 3 (articulated buses).
pub const DOOR3_LAMPS: &[&str] = &["ButtonLight Door 3", "LED Door3", "Door3Open"];

/// Canonical vehicle state for one poll instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VehicleSnapshot {
    pub ignition_on: bool,
    pub engine_running: bool,
    pub fog_front_on: bool,
    pub fog_rear_on: bool,
    pub front_door_open: bool,
    pub rear_door_open: bool,
    pub kneeling: bool,
    /// -1 = reverse, 0 = neutral, 1 = drive.
    pub gear: i8,
    /// km/h, truncated.
    pub speed: u32,
    pub connected: bool,
}

impl VehicleSnapshot {
    pub fn both_doors_open(&self) -> bool {
        self.front_door_open && self.rear_door_open
    }
}

/// Lenient numeric parse: lamp values arrive as `"1"`, `"0.0"`, sometimes as
/// bare numbers. Anything else is treated as absent, never as an error.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// True when any alias is present in the lamp table with a value > 0.
pub fn lamp_on(lamps: &HashMap<String, Value>, aliases: &[&str]) -> bool {
    aliases
        .iter()
        .any(|name| lamps.get(*name).and_then(numeric).is_some_and(|v| v > 0.0))
}

/// Classifies one poll's variable set into a fresh snapshot. `prev` supplies
/// the sticky fields: gear holds its value while the `GearSwitch` button is
/// absent, and speed holds its value when no speed field parses.
pub fn classify(vars: &VehicleVars, prev: &VehicleSnapshot) -> VehicleSnapshot {
    let lamps = &vars.all_lamps;

    let mut gear = prev.gear;
    for button in &vars.buttons {
        if button.name == "GearSwitch" {
            gear = match button.state.as_str() {
                "Drive" => 1,
                "Reverse" => -1,
                _ => 0,
            };
        }
    }

    let mut speed = prev.speed;
    // Velocity is either {Speed: m/s} or a bare scalar in m/s.
    if let Some(velocity) = &vars.velocity {
        let raw = match velocity {
            Value::Object(map) => map.get("Speed").and_then(numeric),
            other => numeric(other),
        };
        if let Some(v) = raw {
            speed = (v.abs() * 3.6) as u32;
        }
    }
    // A direct Speed field is already km/h and takes precedence.
    if let Some(v) = vars.speed.as_ref().and_then(numeric) {
        speed = v.abs() as u32;
    }

    VehicleSnapshot {
        ignition_on: lamp_on(lamps, IGNITION_LAMPS),
        engine_running: lamp_on(lamps, ENGINE_LAMPS),
        fog_front_on: lamp_on(lamps, FOG_FRONT_LAMPS),
        fog_rear_on: lamp_on(lamps, FOG_REAR_LAMPS),
        front_door_open: lamp_on(lamps, DOOR1_LAMPS),
        rear_door_open: lamp_on(lamps, DOOR2_LAMPS) || lamp_on(lamps, DOOR3_LAMPS),
        kneeling: lamp_on(lamps, KNEELING_LAMPS),
        gear,
        speed,
        connected: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Button;
    use serde_json::json;

    fn lamps(entries: &[(&str, Value)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn vars_with_lamps(entries: &[(&str, Value)]) -> VehicleVars {
        VehicleVars {
            all_lamps: lamps(entries),
            ..Default::default()
        }
    }

    #[test]
    fn lamp_on_any_alias_position() {
        // Same truth value whichever alias carries the signal.
        for alias in IGNITION_LAMPS {
            let table = lamps(&[(alias, json!("1"))]);
            assert!(lamp_on(&table, IGNITION_LAMPS), "alias {}", alias);
        }
    }

    #[test]
    fn lamp_off_when_all_aliases_absent() {
        let table = lamps(&[("LED SomethingElse", json!("1"))]);
        assert!(!lamp_on(&table, IGNITION_LAMPS));
    }

    #[test]
    fn lamp_off_for_zero_and_garbage_values() {
        assert!(!lamp_on(&lamps(&[("Ignition", json!("0"))]), IGNITION_LAMPS));
        assert!(!lamp_on(&lamps(&[("Ignition", json!("-1"))]), IGNITION_LAMPS));
        assert!(!lamp_on(&lamps(&[("Ignition", json!("on"))]), IGNITION_LAMPS));
        assert!(!lamp_on(&lamps(&[("Ignition", json!(null))]), IGNITION_LAMPS));
    }

    #[test]
    fn lamp_on_accepts_bare_numbers() {
        assert!(lamp_on(&lamps(&[("Ignition", json!(1))]), IGNITION_LAMPS));
        assert!(lamp_on(&lamps(&[("Ignition", json!(0.5))]), IGNITION_LAMPS));
    }

    #[test]
    fn rear_door_is_door2_or_door3() {
        let prev = VehicleSnapshot::default();
        let snap = classify(&vars_with_lamps(&[("Door3Open", json!("1"))]), &prev);
        assert!(snap.rear_door_open);
        assert!(!snap.front_door_open);
    }

    #[test]
    fn gear_from_gearswitch_button() {
        let prev = VehicleSnapshot::default();
        for (state, expected) in [("Drive", 1i8), ("Reverse", -1), ("Neutral", 0), ("P", 0)] {
            let vars = VehicleVars {
                buttons: vec![Button {
                    name: "GearSwitch".to_string(),
                    state: state.to_string(),
                }],
                ..Default::default()
            };
            assert_eq!(classify(&vars, &prev).gear, expected, "state {}", state);
        }
    }

    #[test]
    fn gear_sticky_when_button_absent() {
        let prev = VehicleSnapshot {
            gear: -1,
            ..Default::default()
        };
        let snap = classify(&VehicleVars::default(), &prev);
        assert_eq!(snap.gear, -1);
    }

    #[test]
    fn speed_from_direct_field_absolute_truncated() {
        let prev = VehicleSnapshot::default();
        let vars = VehicleVars {
            speed: Some(json!("-42.9")),
            ..Default::default()
        };
        assert_eq!(classify(&vars, &prev).speed, 42);
    }

    #[test]
    fn speed_from_velocity_object_converts_to_kmh() {
        let prev = VehicleSnapshot::default();
        let vars = VehicleVars {
            velocity: Some(json!({"Speed": 10.0})), // 10 m/s = 36 km/h
            ..Default::default()
        };
        assert_eq!(classify(&vars, &prev).speed, 36);
    }

    #[test]
    fn direct_speed_overrides_velocity() {
        let prev = VehicleSnapshot::default();
        let vars = VehicleVars {
            velocity: Some(json!(10.0)),
            speed: Some(json!("7")),
            ..Default::default()
        };
        assert_eq!(classify(&vars, &prev).speed, 7);
    }

    #[test]
    fn speed_sticky_on_parse_failure() {
        let prev = VehicleSnapshot {
            speed: 55,
            ..Default::default()
        };
        let vars = VehicleVars {
            speed: Some(json!("n/a")),
            ..Default::default()
        };
        assert_eq!(classify(&vars, &prev).speed, 55);
    }

    #[test]
    fn classify_marks_connected() {
        let snap = classify(&VehicleVars::default(), &VehicleSnapshot::default());
        assert!(snap.connected);
    }
}
