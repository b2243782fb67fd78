//! Fault, warning and notice aggregation plus the torque multiplier.
//!
//! Every bit below is owned by exactly one check, and every check runs every
//! cycle, so a fresh [`SafetyStatus`] never carries a stale bit. State that
//! must survive between cycles (the implausibility latch, the low-voltage
//! hysteresis bands) lives in [`SafetyMonitor`], not in the status.

use bitflags::bitflags;

use crate::config::SafetyCfg;
use crate::sensor::{CalibratedSensor, PedalSensors};
use crate::telemetry::DeviceState;

bitflags! {
    /// Torque-disabling conditions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Faults: u32 {
        const TPS0_POWER = 1 << 0;
        const TPS0_SIGNAL = 1 << 1;
        const TPS0_READ = 1 << 2;
        const TPS0_UNCALIBRATED = 1 << 3;
        const TPS0_OUT_OF_RANGE = 1 << 4;
        const TPS1_POWER = 1 << 5;
        const TPS1_SIGNAL = 1 << 6;
        const TPS1_READ = 1 << 7;
        const TPS1_UNCALIBRATED = 1 << 8;
        const TPS1_OUT_OF_RANGE = 1 << 9;
        const BPS0_POWER = 1 << 10;
        const BPS0_SIGNAL = 1 << 11;
        const BPS0_READ = 1 << 12;
        const BPS0_UNCALIBRATED = 1 << 13;
        const BPS0_OUT_OF_RANGE = 1 << 14;
        const BPS1_POWER = 1 << 15;
        const BPS1_SIGNAL = 1 << 16;
        const BPS1_READ = 1 << 17;
        const BPS1_UNCALIBRATED = 1 << 18;
        const BPS1_OUT_OF_RANGE = 1 << 19;
        /// Throttle sensors disagree by more than the allowed fraction.
        const TPS_DISCREPANCY = 1 << 20;
        /// Brake and throttle pressed together; latched until throttle is released.
        const BRAKE_THROTTLE_IMPLAUSIBLE = 1 << 21;
    }
}

bitflags! {
    /// Operator-visible, not torque-disabling.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Warnings: u8 {
        const LV_CRITICAL = 1 << 0;
        const LV_LOW = 1 << 1;
    }
}

bitflags! {
    /// Informational.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Notices: u8 {
        /// Interlock sense is false; high voltage is not available.
        const HV_INTERLOCK_OPEN = 1 << 0;
        const BMS_POWER_LIMIT = 1 << 1;
        const MCU_POWER_LIMIT = 1 << 2;
        /// Motor controller is reporting nonzero fault words.
        const MCU_FAULT = 1 << 3;
    }
}

/// One sensor's slice of the fault bits.
struct SensorBits {
    power: Faults,
    signal: Faults,
    read: Faults,
    uncalibrated: Faults,
    out_of_range: Faults,
}

const TPS0_BITS: SensorBits = SensorBits {
    power: Faults::TPS0_POWER,
    signal: Faults::TPS0_SIGNAL,
    read: Faults::TPS0_READ,
    uncalibrated: Faults::TPS0_UNCALIBRATED,
    out_of_range: Faults::TPS0_OUT_OF_RANGE,
};
const TPS1_BITS: SensorBits = SensorBits {
    power: Faults::TPS1_POWER,
    signal: Faults::TPS1_SIGNAL,
    read: Faults::TPS1_READ,
    uncalibrated: Faults::TPS1_UNCALIBRATED,
    out_of_range: Faults::TPS1_OUT_OF_RANGE,
};
const BPS0_BITS: SensorBits = SensorBits {
    power: Faults::BPS0_POWER,
    signal: Faults::BPS0_SIGNAL,
    read: Faults::BPS0_READ,
    uncalibrated: Faults::BPS0_UNCALIBRATED,
    out_of_range: Faults::BPS0_OUT_OF_RANGE,
};
const BPS1_BITS: SensorBits = SensorBits {
    power: Faults::BPS1_POWER,
    signal: Faults::BPS1_SIGNAL,
    read: Faults::BPS1_READ,
    uncalibrated: Faults::BPS1_UNCALIBRATED,
    out_of_range: Faults::BPS1_OUT_OF_RANGE,
};

fn sensor_faults(s: &CalibratedSensor, bits: &SensorBits) -> Faults {
    let mut f = Faults::empty();
    f.set(bits.power, s.power_status().failed());
    f.set(bits.signal, s.signal_status().failed());
    f.set(bits.read, s.read_status().failed());
    f.set(bits.uncalibrated, !s.is_calibrated());
    f.set(bits.out_of_range, s.out_of_range());
    f
}

/// Aggregated result of one safety pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SafetyStatus {
    pub faults: Faults,
    pub warnings: Warnings,
    pub notices: Notices,
    /// Scale applied to requested torque, `[0, 1]`; exactly 0 with any fault.
    pub torque_multiplier: f32,
}

impl SafetyStatus {
    pub fn has_fault(&self) -> bool {
        !self.faults.is_empty()
    }
}

/// Inputs read directly from the IO driver rather than via sensors or CAN.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SafetyInputs {
    /// Interlock loop sense; true when high voltage is present.
    pub hvil: bool,
    /// `None` until the LV battery has been read once; the LV warnings keep
    /// their previous state meanwhile.
    pub lv_battery_v: Option<f32>,
}

/// A torque derating rule. Policies compose by minimum.
pub trait DeratePolicy: std::fmt::Debug {
    fn name(&self) -> &'static str;
    /// Multiplier in `[0, 1]` for the current device state.
    fn multiplier(&self, device: &DeviceState) -> f32;
}

/// Linear taper on the larger of battery and inverter power: full torque at
/// `start_kw`, none at `cap_kw`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerDerate {
    pub start_kw: f32,
    pub cap_kw: f32,
}

impl DeratePolicy for PowerDerate {
    fn name(&self) -> &'static str {
        "power"
    }

    fn multiplier(&self, device: &DeviceState) -> f32 {
        let p = device.bms.power_kw().max(device.mcu.power_kw());
        if p <= self.start_kw {
            1.0
        } else if p >= self.cap_kw {
            0.0
        } else {
            (self.cap_kw - p) / (self.cap_kw - self.start_kw)
        }
    }
}

/// Keep discharge current under the BMS discharge current limit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DischargeLimitDerate;

impl DeratePolicy for DischargeLimitDerate {
    fn name(&self) -> &'static str {
        "discharge_limit"
    }

    fn multiplier(&self, device: &DeviceState) -> f32 {
        let bms = &device.bms;
        // no limit known yet
        if bms.frames_seen == 0 || bms.pack_current_a <= 0 {
            return 1.0;
        }
        (f32::from(bms.discharge_limit_a) / f32::from(bms.pack_current_a)).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct LvBands {
    critical: bool,
    low: bool,
}

#[derive(Debug)]
pub struct SafetyMonitor {
    cfg: SafetyCfg,
    policies: Vec<Box<dyn DeratePolicy>>,
    implausible_latched: bool,
    lv: LvBands,
    last: SafetyStatus,
}

impl SafetyMonitor {
    pub fn new(cfg: SafetyCfg) -> Self {
        Self {
            cfg,
            policies: Vec::new(),
            implausible_latched: false,
            lv: LvBands::default(),
            last: SafetyStatus::default(),
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn DeratePolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn add_policy(&mut self, policy: Box<dyn DeratePolicy>) {
        self.policies.push(policy);
    }

    pub fn cfg(&self) -> &SafetyCfg {
        &self.cfg
    }

    /// Status from the most recent `update`.
    pub fn last(&self) -> &SafetyStatus {
        &self.last
    }

    pub fn implausibility_latched(&self) -> bool {
        self.implausible_latched
    }

    /// Run every check once and return the fresh status.
    pub fn update(
        &mut self,
        device: &DeviceState,
        sensors: &PedalSensors,
        inputs: &SafetyInputs,
    ) -> SafetyStatus {
        let faults = self.check_faults(sensors);
        let warnings = self.check_lv(inputs.lv_battery_v);
        let notices = self.check_notices(device, inputs);
        let torque_multiplier = if faults.is_empty() {
            self.derate(device)
        } else {
            0.0
        };

        let status = SafetyStatus {
            faults,
            warnings,
            notices,
            torque_multiplier,
        };
        let raised = status.faults.difference(self.last.faults);
        if !raised.is_empty() {
            tracing::warn!(faults = ?raised, "safety faults raised");
        }
        let cleared = self.last.faults.difference(status.faults);
        if !cleared.is_empty() {
            tracing::info!(faults = ?cleared, "safety faults cleared");
        }
        if status.warnings != self.last.warnings {
            tracing::warn!(warnings = ?status.warnings, lv_v = ?inputs.lv_battery_v, "low-voltage warnings changed");
        }
        self.last = status;
        status
    }

    fn check_faults(&mut self, sensors: &PedalSensors) -> Faults {
        let mut f = sensor_faults(&sensors.tps0, &TPS0_BITS)
            | sensor_faults(&sensors.tps1, &TPS1_BITS)
            | sensor_faults(&sensors.bps0, &BPS0_BITS)
            | sensor_faults(&sensors.bps1, &BPS1_BITS);

        // non-latching
        let gap = (sensors.tps0.percent() - sensors.tps1.percent()).abs();
        f.set(Faults::TPS_DISCREPANCY, gap > self.cfg.tps_discrepancy);

        let throttle = sensors.throttle();
        let brake = sensors.brake();
        if self.implausible_latched && throttle < self.cfg.implausible_clear_throttle {
            self.implausible_latched = false;
        }
        if brake > self.cfg.implausible_brake && throttle > self.cfg.implausible_throttle {
            self.implausible_latched = true;
        }
        f.set(Faults::BRAKE_THROTTLE_IMPLAUSIBLE, self.implausible_latched);
        f
    }

    fn check_lv(&mut self, volts: Option<f32>) -> Warnings {
        if let Some(volts) = volts {
            let h = self.cfg.lv_hysteresis_v;
            self.lv.critical = band(self.lv.critical, volts, self.cfg.lv_critical_v, h);
            self.lv.low = band(self.lv.low, volts, self.cfg.lv_low_v, h);
        }
        let mut w = Warnings::empty();
        w.set(Warnings::LV_CRITICAL, self.lv.critical);
        w.set(Warnings::LV_LOW, self.lv.low);
        w
    }

    fn check_notices(&self, device: &DeviceState, inputs: &SafetyInputs) -> Notices {
        let mut n = Notices::empty();
        n.set(Notices::HV_INTERLOCK_OPEN, !inputs.hvil);
        n.set(
            Notices::BMS_POWER_LIMIT,
            device.bms.power_kw() > self.cfg.power_notice_kw,
        );
        n.set(
            Notices::MCU_POWER_LIMIT,
            device.mcu.power_kw() > self.cfg.power_notice_kw,
        );
        n.set(Notices::MCU_FAULT, device.mcu.has_fault());
        n
    }

    fn derate(&self, device: &DeviceState) -> f32 {
        let m = self
            .policies
            .iter()
            .map(|p| {
                let m = p.multiplier(device);
                tracing::trace!(policy = p.name(), multiplier = m, "derate");
                m
            })
            .fold(1.0_f32, f32::min);
        if m.is_nan() { 0.0 } else { m.clamp(0.0, 1.0) }
    }
}

/// Below `threshold` sets the band; it clears only at `threshold + hysteresis`.
fn band(active: bool, volts: f32, threshold: f32, hysteresis: f32) -> bool {
    if active {
        volts < threshold + hysteresis
    } else {
        volts < threshold
    }
}
