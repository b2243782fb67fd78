#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Vehicle control core (hardware-agnostic).
//!
//! All hardware goes through the `vcu_traits` seams: `Inputs`, `Outputs`,
//! and one `CanTransport` per CAN channel. Time comes from an injected
//! `Clock`, so the whole core runs deterministically under test.
//!
//! ## Architecture
//!
//! - **Sensors**: min/max calibrated pedal and brake inputs (`sensor`)
//! - **Device state**: decoded motor controller and BMS telemetry (`telemetry`)
//! - **Routing**: inbound demultiplexing plus high→low mirroring (`router`)
//! - **Scheduling**: per-identifier throttle and keep-alive (`scheduler`)
//! - **Safety**: fault/warning/notice sets and the torque multiplier (`safety`)
//! - **Handshake**: lockout → enable → ready-to-drive sound (`handshake`)
//! - **Torque**: pedal → control frame `0xC0` (`torque`)
//! - **Cycle**: the per-cycle context `VcuCore` (`core`) and the paced loop
//!   (`runner`)
//!
//! ## Fixed-Point Units
//!
//! Torque is carried as `i16` deci-newton-metres on the wire; see
//! `fixed_point::quantize_to_dnm_i16`.

pub mod broadcast;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod core;
pub mod error;
pub mod fixed_point;
pub mod handshake;
pub mod hw_error;
pub mod mocks;
pub mod router;
pub mod runner;
pub mod safety;
pub mod scheduler;
pub mod sensor;
pub mod status;
pub mod telemetry;
pub mod torque;
pub mod util;

pub use crate::builder::{BoxedCore, Missing, Set, Vcu, VcuBuilder, build_vcu};
pub use crate::config::{
    CycleCfg, Direction, HandshakeCfg, PedalSetup, SafetyCfg, SensorSetup, TorqueCfg, VcuSettings,
};
pub use crate::core::VcuCore;
pub use crate::error::{BuildError, Report, Result, TransportFault, VcuError};
pub use crate::handshake::{HandshakeInputs, HandshakeStage, HandshakeStateMachine};
pub use crate::router::{CanFrameRouter, Route};
pub use crate::runner::{CycleStats, RunSummary, run};
pub use crate::safety::{
    DeratePolicy, DischargeLimitDerate, Faults, Notices, PowerDerate, SafetyInputs, SafetyMonitor,
    SafetyStatus, Warnings,
};
pub use crate::scheduler::{MessageId, MessageScheduler, Offer, ScheduleRule};
pub use crate::sensor::{CalibratedSensor, Calibration, IoStatus, PedalSensors, SensorSpec};
pub use crate::status::{ChannelCounters, CycleReport, TransportCounters};
pub use crate::telemetry::{BatteryTelemetry, DeviceState, MotorControllerTelemetry};
pub use crate::torque::{TorqueCommand, TorqueCommandPipeline, decode_control_frame};
