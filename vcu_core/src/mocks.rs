//! Hardware-free collaborators for tests and benches.

use std::collections::{HashMap, VecDeque};

use vcu_traits::{AnalogChannel, BoxError, CanFrame, CanTransport, DigitalChannel, Inputs, Light, Outputs};

/// Inputs with fixed values; unset analog channels read 0.
#[derive(Debug, Clone, Default)]
pub struct StaticInputs {
    pub analog: HashMap<AnalogChannel, u16>,
    pub hvil: bool,
    pub ready: bool,
}

impl StaticInputs {
    pub fn set(&mut self, ch: AnalogChannel, raw: u16) -> &mut Self {
        self.analog.insert(ch, raw);
        self
    }
}

impl Inputs for StaticInputs {
    fn power_init(&mut self, _ch: AnalogChannel) -> Result<(), BoxError> {
        Ok(())
    }
    fn signal_init(&mut self, _ch: AnalogChannel) -> Result<(), BoxError> {
        Ok(())
    }
    fn read_analog(&mut self, ch: AnalogChannel) -> Result<u16, BoxError> {
        Ok(self.analog.get(&ch).copied().unwrap_or(0))
    }
    fn read_digital(&mut self, ch: DigitalChannel) -> Result<bool, BoxError> {
        Ok(match ch {
            DigitalChannel::Hvil => self.hvil,
            DigitalChannel::ReadyButton => self.ready,
        })
    }
}

/// Outputs that accept everything and remember the last light levels.
#[derive(Debug, Clone, Default)]
pub struct NullOutputs {
    pub relay: bool,
    pub lights: HashMap<Light, u8>,
    pub rtds_starts: u32,
}

impl Outputs for NullOutputs {
    fn set_motor_relay(&mut self, on: bool) -> Result<(), BoxError> {
        self.relay = on;
        Ok(())
    }
    fn set_light(&mut self, light: Light, level_pct: u8) -> Result<(), BoxError> {
        self.lights.insert(light, level_pct);
        Ok(())
    }
    fn start_rtds(&mut self, _amplitude_pct: u8, _duration_ms: u32) -> Result<(), BoxError> {
        self.rtds_starts += 1;
        Ok(())
    }
}

/// Unbounded CAN channel: keeps everything written, serves a preloaded inbox.
#[derive(Debug, Clone, Default)]
pub struct RecordingCan {
    pub sent: Vec<CanFrame>,
    pub inbox: VecDeque<CanFrame>,
}

impl CanTransport for RecordingCan {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), BoxError> {
        self.sent.push(*frame);
        Ok(())
    }
    fn receive(&mut self) -> Result<Option<CanFrame>, BoxError> {
        Ok(self.inbox.pop_front())
    }
    fn poll_status(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}
