//! Simulated IO driver for the vehicle control core.
//!
//! Everything here stands in for the vendor driver: analog/digital inputs,
//! lamp/relay/buzzer outputs, and two CAN channels with bounded FIFOs. State
//! is shared through `Rc<RefCell<..>>` handles so a harness can steer inputs
//! and inspect outputs while the core owns its own handle.

pub mod bus;
pub mod devices;
pub mod error;

pub use bus::{BusChannel, SimCanPort, SimulatedBus};
pub use devices::{SimulatedBms, SimulatedInverter};

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use vcu_traits::{AnalogChannel, BoxError, DigitalChannel, Inputs, Light, Outputs};

use crate::error::HwError;

#[derive(Debug, Default)]
struct InputState {
    analog: HashMap<AnalogChannel, u16>,
    digital: HashMap<DigitalChannel, bool>,
    fail_power: HashSet<AnalogChannel>,
    fail_signal: HashSet<AnalogChannel>,
    fail_read: HashSet<AnalogChannel>,
}

/// Simulated sensor inputs. Unset analog channels read 0, unset digital
/// channels read false.
#[derive(Debug, Clone, Default)]
pub struct SimulatedInputs {
    state: Rc<RefCell<InputState>>,
}

impl SimulatedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_analog(&self, ch: AnalogChannel, raw: u16) {
        self.state.borrow_mut().analog.insert(ch, raw);
    }

    pub fn set_digital(&self, ch: DigitalChannel, on: bool) {
        self.state.borrow_mut().digital.insert(ch, on);
    }

    /// Drive a pedal sensor to `fraction` of the travel between its two
    /// calibration endpoints (`[at_rest, at_full_travel]`).
    pub fn set_pedal(&self, ch: AnalogChannel, fraction: f32, endpoints: [u16; 2]) {
        let f = fraction.clamp(0.0, 1.0);
        let [rest, full] = endpoints;
        let raw = f32::from(rest) + (f32::from(full) - f32::from(rest)) * f;
        self.set_analog(ch, raw.round() as u16);
    }

    /// Low-voltage battery in volts.
    pub fn set_lv_battery(&self, volts: f32) {
        let mv = (volts * 1000.0).round().clamp(0.0, f32::from(u16::MAX));
        self.set_analog(AnalogChannel::LvBattery, mv as u16);
    }

    pub fn fail_power_init(&self, ch: AnalogChannel) {
        self.state.borrow_mut().fail_power.insert(ch);
    }

    pub fn fail_signal_init(&self, ch: AnalogChannel) {
        self.state.borrow_mut().fail_signal.insert(ch);
    }

    pub fn set_read_failure(&self, ch: AnalogChannel, failing: bool) {
        let mut s = self.state.borrow_mut();
        if failing {
            s.fail_read.insert(ch);
        } else {
            s.fail_read.remove(&ch);
        }
    }
}

impl Inputs for SimulatedInputs {
    fn power_init(&mut self, ch: AnalogChannel) -> Result<(), BoxError> {
        if self.state.borrow().fail_power.contains(&ch) {
            return Err(Box::new(HwError::SensorPower(ch)));
        }
        Ok(())
    }

    fn signal_init(&mut self, ch: AnalogChannel) -> Result<(), BoxError> {
        if self.state.borrow().fail_signal.contains(&ch) {
            return Err(Box::new(HwError::SensorSignal(ch)));
        }
        Ok(())
    }

    fn read_analog(&mut self, ch: AnalogChannel) -> Result<u16, BoxError> {
        let s = self.state.borrow();
        if s.fail_read.contains(&ch) {
            return Err(Box::new(HwError::SensorRead(ch)));
        }
        Ok(s.analog.get(&ch).copied().unwrap_or(0))
    }

    fn read_digital(&mut self, ch: DigitalChannel) -> Result<bool, BoxError> {
        Ok(self.state.borrow().digital.get(&ch).copied().unwrap_or(false))
    }
}

#[derive(Debug, Default)]
struct OutputState {
    motor_relay: bool,
    lights: HashMap<Light, u8>,
    rtds_starts: u32,
    last_rtds: Option<(u8, u32)>,
}

/// Simulated actuators; records what the core commanded.
#[derive(Debug, Clone, Default)]
pub struct SimulatedOutputs {
    state: Rc<RefCell<OutputState>>,
}

impl SimulatedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn motor_relay(&self) -> bool {
        self.state.borrow().motor_relay
    }

    pub fn light(&self, light: Light) -> u8 {
        self.state.borrow().lights.get(&light).copied().unwrap_or(0)
    }

    /// Number of times the ready-to-drive sound was started.
    pub fn rtds_starts(&self) -> u32 {
        self.state.borrow().rtds_starts
    }

    pub fn last_rtds(&self) -> Option<(u8, u32)> {
        self.state.borrow().last_rtds
    }
}

impl Outputs for SimulatedOutputs {
    fn set_motor_relay(&mut self, on: bool) -> Result<(), BoxError> {
        let mut s = self.state.borrow_mut();
        if s.motor_relay != on {
            tracing::debug!(on, "motor relay (simulated)");
        }
        s.motor_relay = on;
        Ok(())
    }

    fn set_light(&mut self, light: Light, level_pct: u8) -> Result<(), BoxError> {
        if level_pct > 100 {
            return Err(Box::new(HwError::Output(format!(
                "light level {level_pct}% out of range"
            ))));
        }
        self.state.borrow_mut().lights.insert(light, level_pct);
        Ok(())
    }

    fn start_rtds(&mut self, amplitude_pct: u8, duration_ms: u32) -> Result<(), BoxError> {
        let mut s = self.state.borrow_mut();
        s.rtds_starts = s.rtds_starts.saturating_add(1);
        s.last_rtds = Some((amplitude_pct, duration_ms));
        tracing::info!(amplitude_pct, duration_ms, "ready-to-drive sound (simulated)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pedal_maps_fraction_between_endpoints() {
        let mut inputs = SimulatedInputs::new();
        inputs.set_pedal(AnalogChannel::Tps0, 0.5, [500, 4500]);
        inputs.set_pedal(AnalogChannel::Tps1, 0.25, [4500, 500]);
        assert_eq!(inputs.read_analog(AnalogChannel::Tps0).unwrap(), 2500);
        assert_eq!(inputs.read_analog(AnalogChannel::Tps1).unwrap(), 3500);
    }

    #[test]
    fn injected_read_failure_is_typed() {
        let mut inputs = SimulatedInputs::new();
        inputs.set_read_failure(AnalogChannel::Bps0, true);
        let err = inputs.read_analog(AnalogChannel::Bps0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HwError>(),
            Some(HwError::SensorRead(AnalogChannel::Bps0))
        ));
        inputs.set_read_failure(AnalogChannel::Bps0, false);
        assert!(inputs.read_analog(AnalogChannel::Bps0).is_ok());
    }

    #[test]
    fn outputs_record_commands() {
        let outputs = SimulatedOutputs::new();
        let mut handle = outputs.clone();
        handle.set_motor_relay(true).unwrap();
        handle.set_light(Light::Fault, 100).unwrap();
        handle.start_rtds(80, 1500).unwrap();
        assert!(outputs.motor_relay());
        assert_eq!(outputs.light(Light::Fault), 100);
        assert_eq!(outputs.rtds_starts(), 1);
        assert_eq!(outputs.last_rtds(), Some((80, 1500)));
        assert!(handle.set_light(Light::Brake, 101).is_err());
    }
}
