//! Simulated drive: config mapping, simulated car assembly, and the run loop.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use vcu_config::{Config, SensorCfg};
use vcu_core::{CycleReport, HandshakeStage, RunSummary, VcuCore, VcuSettings, build_vcu};
use vcu_hardware::{
    BusChannel, SimCanPort, SimulatedBms, SimulatedBus, SimulatedInputs, SimulatedInverter,
    SimulatedOutputs,
};
use vcu_traits::{AnalogChannel, DigitalChannel};

use crate::cli::{RtLock, RunArgs};
use crate::rt::setup_rt_once;

/// Pedal sweep used to learn calibration when the config has none.
const CALIBRATION_MS: u64 = 400;
/// How long the simulated driver holds the ready button.
const READY_HOLD_MS: u64 = 200;
const BMS_PERIOD_MS: u64 = 100;
const LV_BATTERY_V: f32 = 13.4;
const WHEEL_SPEED_RAW: u16 = 1200;
const SUSPENSION_RAW: u16 = 2048;

type SimCore = VcuCore<SimulatedInputs, SimulatedOutputs, SimCanPort, SimCanPort>;

/// Where the simulated pedal puts a sensor at rest and at full travel.
fn endpoints(s: &SensorCfg) -> [u16; 2] {
    if let Some(cal) = s.calibration {
        return cal;
    }
    let margin = (s.spec_max - s.spec_min) / 16;
    let (lo, hi) = (s.spec_min + margin, s.spec_max - margin);
    if s.reversed { [hi, lo] } else { [lo, hi] }
}

/// 0 → 1 → 0 over `x` in `[0, 1]`.
fn triangle(x: f32) -> f32 {
    1.0 - (2.0 * x.clamp(0.0, 1.0) - 1.0).abs()
}

struct Pedals {
    inputs: SimulatedInputs,
    tps: [(AnalogChannel, [u16; 2]); 2],
    bps: [(AnalogChannel, [u16; 2]); 2],
}

impl Pedals {
    fn new(inputs: SimulatedInputs, cfg: &Config) -> Self {
        let s = &cfg.sensors;
        Self {
            inputs,
            tps: [
                (AnalogChannel::Tps0, endpoints(&s.tps0)),
                (AnalogChannel::Tps1, endpoints(&s.tps1)),
            ],
            bps: [
                (AnalogChannel::Bps0, endpoints(&s.bps0)),
                (AnalogChannel::Bps1, endpoints(&s.bps1)),
            ],
        }
    }

    fn throttle(&self, f: f32) {
        for (ch, ends) in self.tps {
            self.inputs.set_pedal(ch, f, ends);
        }
    }

    fn brake(&self, f: f32) {
        for (ch, ends) in self.bps {
            self.inputs.set_pedal(ch, f, ends);
        }
    }
}

/// Everything on the simulated car besides the core.
struct Car {
    pedals: Pedals,
    inputs: SimulatedInputs,
    bus: SimulatedBus,
    inverter: SimulatedInverter,
    bms: SimulatedBms,
    last_bms_ms: Option<u64>,
    calibrating: bool,
    calibration_done: bool,
    bus_off_injected: bool,
}

impl Car {
    fn drive(&mut self, core: &mut SimCore, report: &CycleReport, args: &RunArgs) {
        let now = report.now_ms;

        // Nodes on the high channel react to what reached the wire.
        let wire = self.bus.flush(BusChannel::High);
        self.inverter.observe(&wire, now);
        for f in self.inverter.tick(now) {
            self.bus.inject(BusChannel::High, f);
        }
        if self.last_bms_ms.is_none_or(|t| now.saturating_sub(t) >= BMS_PERIOD_MS) {
            self.bms.pack_current_a = if self.inverter.is_enabled() {
                (self.inverter.commanded_nm() / 2.0) as i16
            } else {
                0
            };
            for f in self.bms.frames() {
                if !self.bus.inject(BusChannel::High, f) {
                    tracing::trace!(id = f.id(), "bms frame dropped, read fifo full");
                }
            }
            self.last_bms_ms = Some(now);
        }
        self.bus.flush(BusChannel::Low);

        if let Some(at) = args.bus_off_at_ms
            && now >= at
            && !self.bus_off_injected
        {
            tracing::warn!(now_ms = now, "injecting bus-off on high channel");
            self.bus.set_bus_off(BusChannel::High);
            self.bus_off_injected = true;
        }

        // Driver inputs for the next cycle.
        if self.calibrating {
            if now >= CALIBRATION_MS {
                self.calibrating = false;
                self.calibration_done = true;
                let learned = core.end_calibration();
                tracing::info!(learned = learned.iter().filter(|c| c.is_some()).count(), "calibration sweep finished");
                self.pedals.throttle(0.0);
                self.pedals.brake(0.0);
            } else {
                let x = now as f32 / CALIBRATION_MS as f32;
                self.pedals.throttle(triangle(2.0 * x));
                self.pedals.brake(triangle(2.0 * x - 1.0));
            }
            return;
        }

        let hvil = args.hvil_drop_at_ms.is_none_or(|t| now < t);
        self.inputs.set_digital(DigitalChannel::Hvil, hvil);
        let ready = now >= args.ready_at_ms && now < args.ready_at_ms + READY_HOLD_MS;
        self.inputs.set_digital(DigitalChannel::ReadyButton, ready);

        let driving = report.stage == HandshakeStage::Driving;
        self.pedals.throttle(if driving { args.throttle } else { 0.0 });
        let braking = args.brake_at_ms.is_some_and(|t| now >= t);
        self.pedals.brake(if braking { 0.5 } else { 0.0 });
    }
}

/// Result of a simulated run plus what the harness observed.
pub struct RunOutcome {
    pub summary: RunSummary,
    pub calibrated_at_runtime: bool,
    pub inverter_timeouts: u32,
    pub rtds_starts: u32,
    pub last_torque_dnm: i16,
}

pub fn run_sim(cfg: &Config, args: &RunArgs, shutdown: Arc<AtomicBool>) -> eyre::Result<RunOutcome> {
    #[cfg(target_os = "linux")]
    setup_rt_once(args.rt, args.rt_prio, args.rt_lock.unwrap_or(RtLock::os_default()), args.rt_cpu);
    #[cfg(not(target_os = "linux"))]
    setup_rt_once(args.rt, args.rt_lock.unwrap_or(RtLock::os_default()));

    let settings = VcuSettings::from(cfg);
    let bus = SimulatedBus::new(
        (cfg.can.high.read_fifo_depth, cfg.can.high.write_fifo_depth),
        (cfg.can.low.read_fifo_depth, cfg.can.low.write_fifo_depth),
    );
    let inputs = SimulatedInputs::new();
    let outputs = SimulatedOutputs::new();
    inputs.set_lv_battery(LV_BATTERY_V);
    for ch in AnalogChannel::WHEEL_SPEEDS {
        inputs.set_analog(ch, WHEEL_SPEED_RAW);
    }
    for ch in AnalogChannel::SUSPENSION {
        inputs.set_analog(ch, SUSPENSION_RAW);
    }
    inputs.set_digital(DigitalChannel::Hvil, true);

    let mut core = build_vcu(
        inputs.clone(),
        outputs.clone(),
        bus.port(BusChannel::High),
        bus.port(BusChannel::Low),
        settings,
        None,
    )?;

    let s = &cfg.sensors;
    let needs_calibration = [&s.tps0, &s.tps1, &s.bps0, &s.bps1]
        .iter()
        .any(|c| c.calibration.is_none());
    if needs_calibration {
        tracing::info!(sweep_ms = CALIBRATION_MS, "pedal calibration sweep");
        core.begin_calibration();
    }

    let pedals = Pedals::new(inputs.clone(), cfg);
    pedals.throttle(0.0);
    pedals.brake(0.0);
    let mut car = Car {
        pedals,
        inputs,
        bus,
        inverter: SimulatedInverter::default(),
        bms: SimulatedBms::default(),
        last_bms_ms: None,
        calibrating: needs_calibration,
        calibration_done: false,
        bus_off_injected: false,
    };

    let mut last_torque_dnm = 0;
    let summary = vcu_core::run(&mut core, args.cycles, &shutdown, |core, report| {
        last_torque_dnm = report.torque_dnm;
        car.drive(core, report, args);
    });

    Ok(RunOutcome {
        summary,
        calibrated_at_runtime: car.calibration_done,
        inverter_timeouts: car.inverter.timeouts(),
        rtds_starts: outputs.rtds_starts(),
        last_torque_dnm,
    })
}
