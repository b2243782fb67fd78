#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the vehicle control unit.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section except `[sensors]` has defaults matching the car as built;
//!   a file only needs to spell out what differs.
use serde::Deserialize;

/// CAN bit rates the controller can be clocked for.
pub const SUPPORTED_BITRATES_KBPS: [u32; 4] = [125, 250, 500, 1000];

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CycleCfg {
    /// Fixed cycle period in milliseconds.
    pub period_ms: u64,
    /// Upper bound on inbound frames routed per cycle.
    pub max_frames_per_cycle: usize,
}

impl Default for CycleCfg {
    fn default() -> Self {
        Self {
            period_ms: 5,
            max_frames_per_cycle: 25,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ChannelCfg {
    pub bitrate_kbps: u32,
    pub read_fifo_depth: u16,
    pub write_fifo_depth: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CanCfg {
    /// Hardware message objects shared by both channels and both directions.
    pub message_object_budget: u16,
    /// First identifier of the sensor broadcast block (offsets 0..=0xA).
    pub sensor_broadcast_base_id: u32,
    /// Control / telemetry channel.
    pub high: ChannelCfg,
    /// Logging / mirror channel.
    pub low: ChannelCfg,
}

impl Default for CanCfg {
    fn default() -> Self {
        Self {
            message_object_budget: 128,
            sensor_broadcast_base_id: 0x500,
            high: ChannelCfg {
                bitrate_kbps: 500,
                read_fifo_depth: 32,
                write_fifo_depth: 16,
            },
            low: ChannelCfg {
                bitrate_kbps: 500,
                read_fifo_depth: 8,
                write_fifo_depth: 40,
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SensorCfg {
    /// Datasheet lower bound (raw counts).
    pub spec_min: u16,
    /// Datasheet upper bound (raw counts).
    pub spec_max: u16,
    /// Fixed calibration `[at_rest, at_full_travel]`. Absent means the sensor
    /// must be calibrated at runtime before it reports travel.
    #[serde(default)]
    pub calibration: Option<[u16; 2]>,
    /// Sensor output falls as the pedal is pressed.
    #[serde(default)]
    pub reversed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorsCfg {
    pub tps0: SensorCfg,
    pub tps1: SensorCfg,
    pub bps0: SensorCfg,
    pub bps1: SensorCfg,
}

impl Default for SensorsCfg {
    fn default() -> Self {
        let pedal = SensorCfg {
            spec_min: 200,
            spec_max: 4800,
            calibration: None,
            reversed: false,
        };
        Self {
            tps0: pedal,
            tps1: SensorCfg {
                reversed: true,
                ..pedal
            },
            bps0: SensorCfg {
                spec_min: 500,
                spec_max: 4500,
                ..pedal
            },
            bps1: SensorCfg {
                spec_min: 500,
                spec_max: 4500,
                ..pedal
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Reverse,
    #[default]
    Forward,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TorqueCfg {
    /// Torque requested at full pedal, newton-metres.
    pub max_torque_nm: f32,
    pub direction: Direction,
}

impl Default for TorqueCfg {
    fn default() -> Self {
        Self {
            max_torque_nm: 100.0,
            direction: Direction::Forward,
        }
    }
}

/// Torque derating policy. All configured policies apply; the lowest wins.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerateCfg {
    /// Linear taper from `start_kw` (full torque) to `cap_kw` (no torque).
    Power { start_kw: f32, cap_kw: f32 },
    /// Scale torque by BMS discharge limit over measured discharge current.
    DischargeLimit,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Safety {
    /// Max allowed disagreement between the two throttle sensors (fraction).
    pub tps_discrepancy: f32,
    /// Brake fraction above which throttle is implausible.
    pub implausible_brake: f32,
    /// Throttle fraction above which pressing the brake latches the fault.
    pub implausible_throttle: f32,
    /// Throttle fraction below which the latched fault clears.
    pub implausible_clear_throttle: f32,
    pub lv_critical_v: f32,
    pub lv_low_v: f32,
    /// Voltage margin above a threshold before its warning clears.
    pub lv_hysteresis_v: f32,
    /// Power above which the power-limit notices are raised.
    pub power_notice_kw: f32,
    /// Brake fraction that turns the brake light on.
    pub brake_light: f32,
    pub derate: Vec<DerateCfg>,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            tps_discrepancy: 0.10,
            implausible_brake: 0.25,
            implausible_throttle: 0.25,
            implausible_clear_throttle: 0.10,
            lv_critical_v: 9.2,
            lv_low_v: 12.73,
            lv_hysteresis_v: 0.2,
            power_notice_kw: 75.0,
            brake_light: 0.20,
            derate: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HandshakeCfg {
    /// Throttle fraction below which the ready button is honoured.
    pub ready_throttle_max: f32,
    pub rtds_amplitude_pct: u8,
    pub rtds_duration_ms: u32,
}

impl Default for HandshakeCfg {
    fn default() -> Self {
        Self {
            ready_throttle_max: 0.05,
            rtds_amplitude_pct: 100,
            rtds_duration_ms: 1500,
        }
    }
}

/// Send discipline for one outbound identifier.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ScheduleRuleCfg {
    pub id: u32,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Consumer treats silence longer than `max_interval_ms` as a fault.
    #[serde(default)]
    pub required: bool,
    /// 29-bit identifier; standard 11-bit otherwise.
    #[serde(default)]
    pub extended: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cycle: CycleCfg,
    #[serde(default)]
    pub can: CanCfg,
    #[serde(default)]
    pub sensors: SensorsCfg,
    #[serde(default)]
    pub torque: TorqueCfg,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub handshake: HandshakeCfg,
    /// Per-identifier overrides of the built-in send schedule.
    #[serde(default)]
    pub schedule: Vec<ScheduleRuleCfg>,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and parse a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))
}

fn fraction_ok(v: f32) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

fn validate_sensor(name: &str, s: &SensorCfg) -> eyre::Result<()> {
    if s.spec_min >= s.spec_max {
        eyre::bail!("sensors.{name}: spec_min must be < spec_max");
    }
    if let Some([a, b]) = s.calibration {
        if a == b {
            eyre::bail!("sensors.{name}: calibration span must be non-empty");
        }
        let (lo, hi) = (a.min(b), a.max(b));
        if lo < s.spec_min || hi > s.spec_max {
            eyre::bail!("sensors.{name}: calibration must lie within spec bounds");
        }
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Cycle
        if self.cycle.period_ms == 0 {
            eyre::bail!("cycle.period_ms must be >= 1");
        }
        if self.cycle.period_ms > 100 {
            eyre::bail!("cycle.period_ms is unreasonably large (>100ms)");
        }
        if self.cycle.max_frames_per_cycle == 0 {
            eyre::bail!("cycle.max_frames_per_cycle must be >= 1");
        }

        // CAN
        for (name, ch) in [("high", &self.can.high), ("low", &self.can.low)] {
            if !SUPPORTED_BITRATES_KBPS.contains(&ch.bitrate_kbps) {
                eyre::bail!(
                    "can.{name}.bitrate_kbps must be one of {:?}",
                    SUPPORTED_BITRATES_KBPS
                );
            }
            if ch.read_fifo_depth == 0 || ch.write_fifo_depth == 0 {
                eyre::bail!("can.{name}: fifo depths must be >= 1");
            }
        }
        let objects = u32::from(self.can.high.read_fifo_depth)
            + u32::from(self.can.high.write_fifo_depth)
            + u32::from(self.can.low.read_fifo_depth)
            + u32::from(self.can.low.write_fifo_depth);
        if objects > u32::from(self.can.message_object_budget) {
            eyre::bail!(
                "can: fifo depths use {objects} message objects, budget is {}",
                self.can.message_object_budget
            );
        }
        if self.can.sensor_broadcast_base_id + 0xA > 0x7FF {
            eyre::bail!("can.sensor_broadcast_base_id leaves no room for 11 standard frames");
        }

        // Sensors
        validate_sensor("tps0", &self.sensors.tps0)?;
        validate_sensor("tps1", &self.sensors.tps1)?;
        validate_sensor("bps0", &self.sensors.bps0)?;
        validate_sensor("bps1", &self.sensors.bps1)?;

        // Torque
        if !(self.torque.max_torque_nm.is_finite() && self.torque.max_torque_nm > 0.0) {
            eyre::bail!("torque.max_torque_nm must be > 0");
        }
        if self.torque.max_torque_nm * 10.0 > f32::from(i16::MAX) {
            eyre::bail!("torque.max_torque_nm does not fit the control frame");
        }

        // Safety
        let s = &self.safety;
        for (name, v) in [
            ("tps_discrepancy", s.tps_discrepancy),
            ("implausible_brake", s.implausible_brake),
            ("implausible_throttle", s.implausible_throttle),
            ("implausible_clear_throttle", s.implausible_clear_throttle),
            ("brake_light", s.brake_light),
        ] {
            if !fraction_ok(v) {
                eyre::bail!("safety.{name} must be in [0.0, 1.0]");
            }
        }
        if s.implausible_clear_throttle > s.implausible_throttle {
            eyre::bail!("safety.implausible_clear_throttle must be <= implausible_throttle");
        }
        if !(s.lv_critical_v > 0.0 && s.lv_critical_v < s.lv_low_v) {
            eyre::bail!("safety: require 0 < lv_critical_v < lv_low_v");
        }
        if !(s.lv_hysteresis_v.is_finite() && s.lv_hysteresis_v >= 0.0) {
            eyre::bail!("safety.lv_hysteresis_v must be >= 0");
        }
        if !(s.power_notice_kw.is_finite() && s.power_notice_kw > 0.0) {
            eyre::bail!("safety.power_notice_kw must be > 0");
        }
        for d in &s.derate {
            if let DerateCfg::Power { start_kw, cap_kw } = *d
                && !(start_kw >= 0.0 && cap_kw > start_kw)
            {
                eyre::bail!("safety.derate power: require 0 <= start_kw < cap_kw");
            }
        }

        // Handshake
        if !fraction_ok(self.handshake.ready_throttle_max) {
            eyre::bail!("handshake.ready_throttle_max must be in [0.0, 1.0]");
        }
        if self.handshake.rtds_amplitude_pct > 100 {
            eyre::bail!("handshake.rtds_amplitude_pct must be <= 100");
        }

        // Schedule
        let mut seen = std::collections::BTreeSet::new();
        for r in &self.schedule {
            if r.id > 0x1FFF_FFFF {
                eyre::bail!("schedule id {:#x} exceeds 29 bits", r.id);
            }
            if !r.extended && r.id > 0x7FF {
                eyre::bail!("schedule id {:#x} exceeds 11 bits; set extended = true", r.id);
            }
            if r.min_interval_ms > r.max_interval_ms {
                eyre::bail!(
                    "schedule id {:#x}: min_interval_ms must be <= max_interval_ms",
                    r.id
                );
            }
            if !seen.insert((r.extended, r.id)) {
                eyre::bail!("schedule id {:#x} listed twice", r.id);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().expect("defaults are valid");
    }

    #[test]
    fn derate_list_parses_tagged_entries() {
        let cfg = load_toml(
            r#"
[[safety.derate]]
kind = "power"
start_kw = 70.0
cap_kw = 80.0

[[safety.derate]]
kind = "discharge_limit"
"#,
        )
        .expect("parse");
        assert_eq!(
            cfg.safety.derate,
            vec![
                DerateCfg::Power {
                    start_kw: 70.0,
                    cap_kw: 80.0
                },
                DerateCfg::DischargeLimit
            ]
        );
    }
}
