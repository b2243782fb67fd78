//! Collaborator seams for the vehicle control core.
//!
//! The core never touches registers: sensors, outputs and both CAN channels
//! are reached through the traits below, and time through [`Clock`].

pub mod clock;
pub mod frame;

pub use clock::{Clock, MonotonicClock};
pub use frame::{CanFrame, FrameError, FrameFormat};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Analog inputs sampled once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalogChannel {
    Tps0,
    Tps1,
    Bps0,
    Bps1,
    WheelSpeedFl,
    WheelSpeedFr,
    WheelSpeedRl,
    WheelSpeedRr,
    SuspensionFl,
    SuspensionFr,
    SuspensionRl,
    SuspensionRr,
    /// Low-voltage battery, millivolts.
    LvBattery,
}

impl AnalogChannel {
    pub const WHEEL_SPEEDS: [AnalogChannel; 4] = [
        AnalogChannel::WheelSpeedFl,
        AnalogChannel::WheelSpeedFr,
        AnalogChannel::WheelSpeedRl,
        AnalogChannel::WheelSpeedRr,
    ];
    pub const SUSPENSION: [AnalogChannel; 4] = [
        AnalogChannel::SuspensionFl,
        AnalogChannel::SuspensionFr,
        AnalogChannel::SuspensionRl,
        AnalogChannel::SuspensionRr,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigitalChannel {
    /// High-voltage interlock loop sense; true when HV is present and safe.
    Hvil,
    /// Operator ready-to-drive button.
    ReadyButton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Light {
    Fault,
    LvBattery,
    HvPresent,
    ReadyToDrive,
    Brake,
}

/// Sensor side of the IO driver.
pub trait Inputs {
    /// Switch on sensor supply for a channel.
    fn power_init(&mut self, ch: AnalogChannel) -> Result<(), BoxError>;
    /// Configure the signal pin for a channel.
    fn signal_init(&mut self, ch: AnalogChannel) -> Result<(), BoxError>;
    fn read_analog(&mut self, ch: AnalogChannel) -> Result<u16, BoxError>;
    fn read_digital(&mut self, ch: DigitalChannel) -> Result<bool, BoxError>;
}

/// Actuator side of the IO driver.
pub trait Outputs {
    fn set_motor_relay(&mut self, on: bool) -> Result<(), BoxError>;
    /// Light level in percent (0 = off).
    fn set_light(&mut self, light: Light, level_pct: u8) -> Result<(), BoxError>;
    /// Start the ready-to-drive sound. Must not block; the driver times it.
    fn start_rtds(&mut self, amplitude_pct: u8, duration_ms: u32) -> Result<(), BoxError>;
}

/// One physical CAN channel with non-blocking FIFO access.
pub trait CanTransport {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), BoxError>;
    /// Pop one frame from the read FIFO, `Ok(None)` when empty.
    fn receive(&mut self) -> Result<Option<CanFrame>, BoxError>;
    /// Poll controller status; after bus-off this starts hardware recovery.
    fn poll_status(&mut self) -> Result<(), BoxError>;
}

impl<T: Inputs + ?Sized> Inputs for Box<T> {
    fn power_init(&mut self, ch: AnalogChannel) -> Result<(), BoxError> {
        (**self).power_init(ch)
    }
    fn signal_init(&mut self, ch: AnalogChannel) -> Result<(), BoxError> {
        (**self).signal_init(ch)
    }
    fn read_analog(&mut self, ch: AnalogChannel) -> Result<u16, BoxError> {
        (**self).read_analog(ch)
    }
    fn read_digital(&mut self, ch: DigitalChannel) -> Result<bool, BoxError> {
        (**self).read_digital(ch)
    }
}

impl<T: Outputs + ?Sized> Outputs for Box<T> {
    fn set_motor_relay(&mut self, on: bool) -> Result<(), BoxError> {
        (**self).set_motor_relay(on)
    }
    fn set_light(&mut self, light: Light, level_pct: u8) -> Result<(), BoxError> {
        (**self).set_light(light, level_pct)
    }
    fn start_rtds(&mut self, amplitude_pct: u8, duration_ms: u32) -> Result<(), BoxError> {
        (**self).start_rtds(amplitude_pct, duration_ms)
    }
}

impl<T: CanTransport + ?Sized> CanTransport for Box<T> {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), BoxError> {
        (**self).transmit(frame)
    }
    fn receive(&mut self) -> Result<Option<CanFrame>, BoxError> {
        (**self).receive()
    }
    fn poll_status(&mut self) -> Result<(), BoxError> {
        (**self).poll_status()
    }
}
