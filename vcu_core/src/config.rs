//! Runtime configuration used by `VcuCore`.
//!
//! Separate from the TOML schema in `vcu_config`; see `conversions` for the
//! bridge.

use crate::safety::DeratePolicy;
use crate::scheduler::{MessageId, ScheduleRule};
use crate::sensor::{Calibration, SensorSpec};

/// Thresholds for the safety checks. Fractions are pedal travel in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyCfg {
    pub tps_discrepancy: f32,
    pub implausible_brake: f32,
    pub implausible_throttle: f32,
    pub implausible_clear_throttle: f32,
    pub lv_critical_v: f32,
    pub lv_low_v: f32,
    pub lv_hysteresis_v: f32,
    pub power_notice_kw: f32,
    pub brake_light: f32,
}

impl Default for SafetyCfg {
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
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Clockwise, wire value 0.
    Reverse,
    /// Counter-clockwise, wire value 1.
    #[default]
    Forward,
}

impl Direction {
    pub fn wire(self) -> u8 {
        match self {
            Direction::Reverse => 0,
            Direction::Forward => 1,
        }
    }

    pub fn from_wire(b: u8) -> Self {
        if b == 0 { Direction::Reverse } else { Direction::Forward }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorqueCfg {
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

#[derive(Debug, Clone, Copy, PartialEq)]
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

/// Cycle pacing and per-cycle work bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleCfg {
    pub period_ms: u64,
    pub max_frames_per_cycle: usize,
    /// First identifier of the 11 sensor broadcast frames.
    pub broadcast_base_id: u16,
}

impl Default for CycleCfg {
    fn default() -> Self {
        Self {
            period_ms: 5,
            max_frames_per_cycle: 25,
            broadcast_base_id: 0x500,
        }
    }
}

/// Datasheet bounds and optional fixed calibration for one pedal sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSetup {
    pub spec: SensorSpec,
    pub calibration: Option<Calibration>,
}

impl SensorSetup {
    pub fn new(spec_min: u16, spec_max: u16, reversed: bool) -> Self {
        Self {
            spec: SensorSpec {
                spec_min,
                spec_max,
                reversed,
            },
            calibration: None,
        }
    }

    pub fn calibrated(mut self, a: u16, b: u16) -> Self {
        self.calibration = Calibration::new(a, b);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PedalSetup {
    pub tps0: SensorSetup,
    pub tps1: SensorSetup,
    pub bps0: SensorSetup,
    pub bps1: SensorSetup,
}

impl Default for PedalSetup {
    fn default() -> Self {
        Self {
            tps0: SensorSetup::new(200, 4800, false),
            tps1: SensorSetup::new(200, 4800, true),
            bps0: SensorSetup::new(500, 4500, false),
            bps1: SensorSetup::new(500, 4500, false),
        }
    }
}

/// Everything `VcuCore` needs besides its collaborators and clock.
#[derive(Debug, Default)]
pub struct VcuSettings {
    pub cycle: CycleCfg,
    pub pedals: PedalSetup,
    pub torque: TorqueCfg,
    pub safety: SafetyCfg,
    pub handshake: HandshakeCfg,
    pub derate: Vec<Box<dyn DeratePolicy>>,
    /// Per-identifier overrides of the built-in send rules.
    pub schedule: Vec<(MessageId, ScheduleRule)>,
}
