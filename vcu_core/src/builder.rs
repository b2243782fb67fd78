//! Type-state builder for `Vcu` and generic `build_vcu` constructor.
//!
//! The builder enforces at compile time that inputs, outputs and both CAN
//! channels are provided before `build()` is available. `try_build()` is
//! always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use vcu_traits::frame::MAX_STANDARD_ID;
use vcu_traits::{AnalogChannel, CanTransport, Clock, Inputs, MonotonicClock, Outputs};

use crate::broadcast::{BROADCAST_FRAMES, SensorSnapshot};
use crate::config::{SensorSetup, VcuSettings};
use crate::core::VcuCore;
use crate::error::{BuildError, Result};
use crate::handshake::HandshakeStateMachine;
use crate::router::CanFrameRouter;
use crate::safety::{DeratePolicy, SafetyMonitor};
use crate::scheduler::{BROADCAST_RULE, CONTROL_RULE, MessageId, MessageScheduler, ScheduleRule};
use crate::sensor::{CalibratedSensor, PedalSensors};
use crate::status::{CycleReport, TransportCounters};
use crate::torque::{CONTROL_FRAME_ID, TorqueCommandPipeline};
use crate::{config, fixed_point};

// ── Public dynamic-dispatch wrapper ──────────────────────────────────────────

pub type BoxedCore =
    VcuCore<Box<dyn Inputs>, Box<dyn Outputs>, Box<dyn CanTransport>, Box<dyn CanTransport>>;

/// Vehicle control core with boxed collaborators.
pub struct Vcu {
    pub(crate) inner: BoxedCore,
}

impl std::fmt::Debug for Vcu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

impl Vcu {
    pub fn builder() -> VcuBuilder<Missing, Missing, Missing, Missing> {
        VcuBuilder::default()
    }

    /// One control cycle.
    pub fn step(&mut self) -> CycleReport {
        self.inner.step()
    }

    pub fn core(&self) -> &BoxedCore {
        &self.inner
    }

    pub fn core_mut(&mut self) -> &mut BoxedCore {
        &mut self.inner
    }

    pub fn counters(&self) -> &TransportCounters {
        self.inner.counters()
    }

    pub fn into_inner(self) -> BoxedCore {
        self.inner
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

#[derive(Default)]
struct Parts {
    inputs: Option<Box<dyn Inputs>>,
    outputs: Option<Box<dyn Outputs>>,
    high: Option<Box<dyn CanTransport>>,
    low: Option<Box<dyn CanTransport>>,
    settings: VcuSettings,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
}

/// Builder for `Vcu`. All settings are validated on `build()`.
pub struct VcuBuilder<In, Out, Hi, Lo> {
    parts: Parts,
    _marker: PhantomData<(In, Out, Hi, Lo)>,
}

impl Default for VcuBuilder<Missing, Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            parts: Parts::default(),
            _marker: PhantomData,
        }
    }
}

impl<In, Out, Hi, Lo> VcuBuilder<In, Out, Hi, Lo> {
    fn advance<A, B, C, D>(self) -> VcuBuilder<A, B, C, D> {
        VcuBuilder {
            parts: self.parts,
            _marker: PhantomData,
        }
    }

    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<Vcu> {
        let p = self.parts;
        let inputs = p
            .inputs
            .ok_or_else(|| eyre::Report::new(BuildError::MissingInputs))?;
        let outputs = p
            .outputs
            .ok_or_else(|| eyre::Report::new(BuildError::MissingOutputs))?;
        let high = p
            .high
            .ok_or_else(|| eyre::Report::new(BuildError::MissingHighChannel))?;
        let low = p
            .low
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLowChannel))?;
        let inner = validate_and_build(inputs, outputs, high, low, p.settings, p.clock)?;
        Ok(Vcu { inner })
    }

    /// Replace all settings at once (typically converted from a config file).
    pub fn with_settings(mut self, settings: VcuSettings) -> Self {
        self.parts.settings = settings;
        self
    }
    pub fn with_cycle(mut self, cycle: config::CycleCfg) -> Self {
        self.parts.settings.cycle = cycle;
        self
    }
    pub fn with_pedals(mut self, pedals: config::PedalSetup) -> Self {
        self.parts.settings.pedals = pedals;
        self
    }
    pub fn with_torque(mut self, torque: config::TorqueCfg) -> Self {
        self.parts.settings.torque = torque;
        self
    }
    pub fn with_safety(mut self, safety: config::SafetyCfg) -> Self {
        self.parts.settings.safety = safety;
        self
    }
    pub fn with_handshake(mut self, handshake: config::HandshakeCfg) -> Self {
        self.parts.settings.handshake = handshake;
        self
    }
    pub fn with_derate(mut self, policy: Box<dyn DeratePolicy>) -> Self {
        self.parts.settings.derate.push(policy);
        self
    }
    pub fn with_schedule_rule(mut self, key: MessageId, rule: ScheduleRule) -> Self {
        self.parts.settings.schedule.push((key, rule));
        self
    }
    /// Provide a custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.parts.clock = Some(clock);
        self
    }
}

impl<Out, Hi, Lo> VcuBuilder<Missing, Out, Hi, Lo> {
    pub fn with_inputs(mut self, inputs: impl Inputs + 'static) -> VcuBuilder<Set, Out, Hi, Lo> {
        self.parts.inputs = Some(Box::new(inputs));
        self.advance()
    }
}

impl<In, Hi, Lo> VcuBuilder<In, Missing, Hi, Lo> {
    pub fn with_outputs(mut self, outputs: impl Outputs + 'static) -> VcuBuilder<In, Set, Hi, Lo> {
        self.parts.outputs = Some(Box::new(outputs));
        self.advance()
    }
}

impl<In, Out, Lo> VcuBuilder<In, Out, Missing, Lo> {
    /// Control/telemetry channel.
    pub fn with_high_channel(
        mut self,
        can: impl CanTransport + 'static,
    ) -> VcuBuilder<In, Out, Set, Lo> {
        self.parts.high = Some(Box::new(can));
        self.advance()
    }
}

impl<In, Out, Hi> VcuBuilder<In, Out, Hi, Missing> {
    /// Logging/mirror channel.
    pub fn with_low_channel(
        mut self,
        can: impl CanTransport + 'static,
    ) -> VcuBuilder<In, Out, Hi, Set> {
        self.parts.low = Some(Box::new(can));
        self.advance()
    }
}

impl VcuBuilder<Set, Set, Set, Set> {
    /// Validate and build. Only available once every collaborator is set.
    pub fn build(self) -> Result<Vcu> {
        self.try_build()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn fraction(x: f32) -> bool {
    (0.0..=1.0).contains(&x)
}

fn check_sensor(s: &SensorSetup) -> Result<()> {
    if s.spec.spec_min >= s.spec.spec_max {
        return Err(invalid("sensor spec_min must be < spec_max"));
    }
    if let Some(c) = s.calibration
        && (c.min < s.spec.spec_min || c.max > s.spec.spec_max)
    {
        return Err(invalid("sensor calibration must lie within spec bounds"));
    }
    Ok(())
}

/// Validate settings and construct a `VcuCore`.
///
/// Shared by `VcuBuilder::try_build()` and `build_vcu()`.
fn validate_and_build<I, O, H, L>(
    inputs: I,
    outputs: O,
    high: H,
    low: L,
    settings: VcuSettings,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<VcuCore<I, O, H, L>> {
    let VcuSettings {
        cycle,
        pedals,
        torque,
        safety,
        handshake,
        derate,
        schedule,
    } = settings;

    // ── Validation ───────────────────────────────────────────────────────────
    if cycle.period_ms == 0 {
        return Err(invalid("cycle period must be >= 1 ms"));
    }
    if cycle.max_frames_per_cycle == 0 {
        return Err(invalid("max_frames_per_cycle must be >= 1"));
    }
    if u32::from(cycle.broadcast_base_id) + u32::from(BROADCAST_FRAMES - 1) > MAX_STANDARD_ID {
        return Err(invalid("sensor broadcast identifiers must fit 11 bits"));
    }
    if !torque.max_torque_nm.is_finite() || torque.max_torque_nm <= 0.0 {
        return Err(invalid("max torque must be > 0"));
    }
    if fixed_point::quantize_to_dnm_i16(torque.max_torque_nm) == i16::MAX {
        return Err(invalid("max torque does not fit the control frame"));
    }
    for s in [&pedals.tps0, &pedals.tps1, &pedals.bps0, &pedals.bps1] {
        check_sensor(s)?;
    }
    let fractions = [
        safety.tps_discrepancy,
        safety.implausible_brake,
        safety.implausible_throttle,
        safety.implausible_clear_throttle,
        safety.brake_light,
        handshake.ready_throttle_max,
    ];
    if !fractions.iter().all(|f| fraction(*f)) {
        return Err(invalid("safety thresholds must be fractions in [0, 1]"));
    }
    if safety.implausible_clear_throttle > safety.implausible_throttle {
        return Err(invalid("implausibility clear threshold must not exceed its trip threshold"));
    }
    if handshake.rtds_amplitude_pct > 100 {
        return Err(invalid("rtds amplitude must be <= 100%"));
    }
    if schedule
        .iter()
        .any(|(_, r)| r.min_interval_ms > r.max_interval_ms)
    {
        return Err(invalid("schedule min_interval must be <= max_interval"));
    }

    // ── Assemble ─────────────────────────────────────────────────────────────
    let mut scheduler = MessageScheduler::new();
    scheduler.set_rule(MessageId::standard(u32::from(CONTROL_FRAME_ID)), CONTROL_RULE);
    for offset in 0..BROADCAST_FRAMES {
        let id = u32::from(cycle.broadcast_base_id + offset);
        scheduler.set_rule(MessageId::standard(id), BROADCAST_RULE);
    }
    for (key, rule) in schedule {
        scheduler.set_rule(key, rule);
    }

    let mut monitor = SafetyMonitor::new(safety);
    for p in derate {
        monitor.add_policy(p);
    }

    let sensor = |ch, s: SensorSetup| CalibratedSensor::new(ch, s.spec).with_calibration(s.calibration);
    let sensors = PedalSensors {
        tps0: sensor(AnalogChannel::Tps0, pedals.tps0),
        tps1: sensor(AnalogChannel::Tps1, pedals.tps1),
        bps0: sensor(AnalogChannel::Bps0, pedals.bps0),
        bps1: sensor(AnalogChannel::Bps1, pedals.bps1),
    };

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(c) => c,
        None => Arc::new(MonotonicClock::new()),
    };
    let epoch = clock.now();

    Ok(VcuCore {
        inputs,
        outputs,
        high,
        low,
        clock,
        epoch,
        cycle,
        sensors,
        snapshot: SensorSnapshot::default(),
        router: CanFrameRouter::new(cycle.max_frames_per_cycle),
        scheduler,
        safety: monitor,
        handshake: HandshakeStateMachine::new(handshake),
        torque: TorqueCommandPipeline::new(torque),
        counters: TransportCounters::default(),
        output_failures: 0,
        lv_battery_read: false,
        initialized: false,
        cycles: 0,
    })
}

/// Build a statically-dispatched core from concrete collaborators.
pub fn build_vcu<I, O, H, L>(
    inputs: I,
    outputs: O,
    high: H,
    low: L,
    settings: VcuSettings,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<VcuCore<I, O, H, L>>
where
    I: Inputs,
    O: Outputs,
    H: CanTransport,
    L: CanTransport,
{
    validate_and_build(inputs, outputs, high, low, settings, clock)
}
