//! Per-cycle context: owns every component and runs them in order.
//!
//! One call to [`VcuCore::step`] is one cycle:
//! sample inputs → route inbound frames → safety → handshake → outputs →
//! control frame → sensor broadcast → bus-off recovery. Each component is
//! the single writer of its own state; later stages only read it.

use std::sync::Arc;
use std::time::Instant;

use vcu_traits::{AnalogChannel, CanTransport, Clock, DigitalChannel, Inputs, Light, Outputs};

use crate::broadcast::{SensorSnapshot, broadcast_frames};
use crate::config::CycleCfg;
use crate::error::TransportFault;
use crate::handshake::{HandshakeInputs, HandshakeStage, HandshakeStateMachine};
use crate::hw_error::map_hw_error;
use crate::router::CanFrameRouter;
use crate::safety::{Notices, SafetyInputs, SafetyMonitor, SafetyStatus, Warnings};
use crate::scheduler::{MessageScheduler, Offer};
use crate::sensor::{Calibration, PedalSensors};
use crate::status::{CycleReport, TransportCounters};
use crate::telemetry::DeviceState;
use crate::torque::TorqueCommandPipeline;

const LIGHT_ON: u8 = 100;
const LIGHT_DIM: u8 = 50;
const MILLIVOLTS_PER_VOLT: f32 = 1000.0;

/// Vehicle control core, generic over its collaborators.
pub struct VcuCore<I, O, H, L> {
    pub(crate) inputs: I,
    pub(crate) outputs: O,
    pub(crate) high: H,
    pub(crate) low: L,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) cycle: CycleCfg,
    pub(crate) sensors: PedalSensors,
    pub(crate) snapshot: SensorSnapshot,
    pub(crate) router: CanFrameRouter,
    pub(crate) scheduler: MessageScheduler,
    pub(crate) safety: SafetyMonitor,
    pub(crate) handshake: HandshakeStateMachine,
    pub(crate) torque: TorqueCommandPipeline,
    pub(crate) counters: TransportCounters,
    pub(crate) output_failures: u64,
    /// The LV battery has produced at least one reading.
    pub(crate) lv_battery_read: bool,
    pub(crate) initialized: bool,
    pub(crate) cycles: u64,
}

impl<I, O, H, L> std::fmt::Debug for VcuCore<I, O, H, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcuCore")
            .field("stage", &self.handshake.stage())
            .field("cycles", &self.cycles)
            .field("faults", &self.safety.last().faults)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl<I, O, H, L> VcuCore<I, O, H, L>
where
    I: Inputs,
    O: Outputs,
    H: CanTransport,
    L: CanTransport,
{
    /// Power up and configure the pedal sensors. Runs automatically before
    /// the first cycle; failures surface as safety faults.
    pub fn init(&mut self) {
        for s in self.sensors.iter_mut() {
            s.init(&mut self.inputs);
        }
        self.initialized = true;
        tracing::info!(period_ms = self.cycle.period_ms, "vcu core initialised");
    }

    /// Milliseconds since the core was built, by its clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    /// Run one cycle. Never fails: collaborator errors are counted, logged,
    /// and reflected in the report.
    pub fn step(&mut self) -> CycleReport {
        if !self.initialized {
            self.init();
        }
        let now_ms = self.now_ms();
        self.cycles += 1;

        let (hvil, ready_pressed) = self.sample_inputs();

        let drained = self.router.drain(
            &mut self.high,
            &mut self.low,
            &mut self.counters.high,
            &mut self.counters.low,
        );
        let mut bus_off_high = drained.fault == Some(TransportFault::BusOff);

        let lv_battery_v = self
            .lv_battery_read
            .then(|| f32::from(self.snapshot.lv_battery_mv) / MILLIVOLTS_PER_VOLT);
        let status = self.safety.update(
            self.router.state(),
            &self.sensors,
            &SafetyInputs { hvil, lv_battery_v },
        );

        let mcu = &self.router.state().mcu;
        let throttle = self.sensors.throttle();
        let hs = self.handshake.step(&HandshakeInputs {
            hvil: !status.notices.contains(Notices::HV_INTERLOCK_OPEN),
            lockout_disabled: mcu.lockout_disabled,
            inverter_enabled: mcu.inverter_enabled,
            ready_pressed,
            throttle,
        });

        self.drive_outputs(&status, hs.stage, hs.motor_relay, hs.start_rtds);

        let cmd = *self.torque.compute(throttle, status.torque_multiplier, hs.stage);
        let mut control_sent = false;
        match cmd.encode() {
            Ok(frame) => match self.scheduler.offer(&frame, &mut self.high, now_ms) {
                Offer::Sent => {
                    control_sent = true;
                    self.counters.high.frames_sent += 1;
                    self.torque.mark_sent();
                }
                Offer::Held => {}
                Offer::Failed(fault) => {
                    self.counters.high.record(fault);
                    bus_off_high |= fault == TransportFault::BusOff;
                    tracing::warn!(?fault, pending = cmd.updates_since_send, "control frame write failed");
                }
            },
            Err(e) => tracing::error!(error = %e, "control frame encode failed"),
        }
        for e in self.scheduler.overdue(now_ms) {
            tracing::warn!(id = e.key.id, format = ?e.key.format, last_sent_ms = ?e.last_sent_ms, "required frame overdue");
        }

        let (broadcasts_sent, bus_off_low) = self.broadcast(now_ms);

        if bus_off_high {
            self.recover(true);
        }
        if bus_off_low {
            self.recover(false);
        }

        let report = CycleReport {
            now_ms,
            stage: hs.stage,
            status,
            torque_dnm: cmd.torque_dnm,
            control_sent,
            frames_routed: drained.received,
            frames_mirrored: drained.mirrored,
            broadcasts_sent,
            bus_off_recovery: bus_off_high || bus_off_low,
        };
        tracing::debug!(
            now_ms,
            stage = %report.stage,
            torque_dnm = report.torque_dnm,
            faults = report.status.faults.bits(),
            routed = report.frames_routed,
            "cycle"
        );
        report
    }

    /// Read pedals plus auxiliary analog/digital inputs. Digital read
    /// failures read as false, which for the interlock means "open".
    fn sample_inputs(&mut self) -> (bool, bool) {
        for s in self.sensors.iter_mut() {
            s.sample(&mut self.inputs);
        }
        self.snapshot.tps = [self.sensors.tps0.raw(), self.sensors.tps1.raw()];
        self.snapshot.bps = [self.sensors.bps0.raw(), self.sensors.bps1.raw()];

        let inputs = &mut self.inputs;
        let mut read = |ch: AnalogChannel, slot: &mut u16| match inputs.read_analog(ch) {
            Ok(v) => *slot = v,
            Err(e) => tracing::trace!(channel = ?ch, error = %e, "aux read failed"),
        };
        for (ch, slot) in AnalogChannel::WHEEL_SPEEDS
            .iter()
            .zip(self.snapshot.wheel_speed.iter_mut())
        {
            read(*ch, slot);
        }
        for (ch, slot) in AnalogChannel::SUSPENSION
            .iter()
            .zip(self.snapshot.suspension.iter_mut())
        {
            read(*ch, slot);
        }
        match self.inputs.read_analog(AnalogChannel::LvBattery) {
            Ok(mv) => {
                self.snapshot.lv_battery_mv = mv;
                self.lv_battery_read = true;
            }
            Err(e) => tracing::trace!(error = %e, "lv battery read failed"),
        }

        let mut digital = |ch: DigitalChannel| {
            self.inputs.read_digital(ch).unwrap_or_else(|e| {
                tracing::warn!(channel = ?ch, error = %e, "digital read failed");
                false
            })
        };
        let hvil = digital(DigitalChannel::Hvil);
        let ready = digital(DigitalChannel::ReadyButton);
        (hvil, ready)
    }

    fn drive_outputs(&mut self, status: &SafetyStatus, stage: HandshakeStage, relay: bool, rtds: bool) {
        let brake_on = self.sensors.brake() > self.safety.cfg().brake_light;
        let level = |on: bool| if on { LIGHT_ON } else { 0 };
        let lv_level = if status.warnings.contains(Warnings::LV_CRITICAL) {
            LIGHT_ON
        } else if status.warnings.contains(Warnings::LV_LOW) {
            LIGHT_DIM
        } else {
            0
        };
        let lights = [
            (Light::Fault, level(status.has_fault())),
            (Light::LvBattery, lv_level),
            (
                Light::HvPresent,
                level(!status.notices.contains(Notices::HV_INTERLOCK_OPEN)),
            ),
            (Light::ReadyToDrive, level(stage == HandshakeStage::Driving)),
            (Light::Brake, level(brake_on)),
        ];

        let mut failures = 0u64;
        if let Err(e) = self.outputs.set_motor_relay(relay) {
            failures += 1;
            tracing::warn!(error = %map_hw_error(&*e), relay, "motor relay command failed");
        }
        if rtds {
            let cfg = *self.handshake.cfg();
            if let Err(e) = self
                .outputs
                .start_rtds(cfg.rtds_amplitude_pct, cfg.rtds_duration_ms)
            {
                failures += 1;
                tracing::warn!(error = %map_hw_error(&*e), "ready-to-drive sound failed");
            }
        }
        for (light, pct) in lights {
            if let Err(e) = self.outputs.set_light(light, pct) {
                failures += 1;
                tracing::trace!(?light, error = %e, "light command failed");
            }
        }
        self.output_failures += failures;
    }

    /// Offer every broadcast frame on the low channel; stops at the first
    /// failed write. Returns (sent, hit bus-off).
    fn broadcast(&mut self, now_ms: u64) -> (usize, bool) {
        let mut sent = 0;
        for frame in broadcast_frames(self.cycle.broadcast_base_id, &self.snapshot) {
            match self.scheduler.offer(&frame, &mut self.low, now_ms) {
                Offer::Sent => {
                    sent += 1;
                    self.counters.low.frames_sent += 1;
                }
                Offer::Held => {}
                Offer::Failed(fault) => {
                    self.counters.low.record(fault);
                    return (sent, fault == TransportFault::BusOff);
                }
            }
        }
        (sent, false)
    }

    fn recover(&mut self, high: bool) {
        let (name, result, counters) = if high {
            ("high", self.high.poll_status(), &mut self.counters.high)
        } else {
            ("low", self.low.poll_status(), &mut self.counters.low)
        };
        counters.recovery_polls += 1;
        match result {
            Ok(()) => tracing::warn!(channel = name, "bus-off, recovery poll issued"),
            Err(e) => tracing::error!(channel = name, error = %e, "bus-off recovery poll failed"),
        }
    }

    /// Open a calibration window on all four pedal sensors.
    pub fn begin_calibration(&mut self) {
        for s in self.sensors.iter_mut() {
            s.begin_calibration();
        }
    }

    /// Close the calibration windows; order is tps0, tps1, bps0, bps1.
    pub fn end_calibration(&mut self) -> [Option<Calibration>; 4] {
        [
            self.sensors.tps0.end_calibration(),
            self.sensors.tps1.end_calibration(),
            self.sensors.bps0.end_calibration(),
            self.sensors.bps1.end_calibration(),
        ]
    }
}

/// Read-only views; available for any collaborator types.
impl<I, O, H, L> VcuCore<I, O, H, L> {
    pub fn stage(&self) -> HandshakeStage {
        self.handshake.stage()
    }

    pub fn safety_status(&self) -> &SafetyStatus {
        self.safety.last()
    }

    pub fn device(&self) -> &DeviceState {
        self.router.state()
    }

    pub fn sensors(&self) -> &PedalSensors {
        &self.sensors
    }

    pub fn snapshot(&self) -> &SensorSnapshot {
        &self.snapshot
    }

    pub fn scheduler(&self) -> &MessageScheduler {
        &self.scheduler
    }

    pub fn router(&self) -> &CanFrameRouter {
        &self.router
    }

    pub fn counters(&self) -> &TransportCounters {
        &self.counters
    }

    pub fn output_failures(&self) -> u64 {
        self.output_failures
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn cycle_cfg(&self) -> &CycleCfg {
        &self.cycle
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}
