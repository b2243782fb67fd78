//! Min/max calibrated wrapper around a raw analog reading.

use vcu_traits::{AnalogChannel, Inputs};

use crate::hw_error::map_hw_error;

/// Outcome of the last driver call for one step of sensor bring-up/readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoStatus {
    #[default]
    Unknown,
    Ok,
    Failed,
}

impl IoStatus {
    fn from_result<T, E>(r: &Result<T, E>) -> Self {
        if r.is_ok() { Self::Ok } else { Self::Failed }
    }

    #[inline]
    pub fn failed(self) -> bool {
        self == Self::Failed
    }
}

/// Static description of a sensor: datasheet bounds plus wiring direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSpec {
    pub spec_min: u16,
    pub spec_max: u16,
    /// Raw value falls as the pedal is pressed.
    pub reversed: bool,
}

/// Learned calibration endpoints, `min < max` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub min: u16,
    pub max: u16,
}

impl Calibration {
    /// Endpoints in either order; `None` when the span is empty.
    pub fn new(a: u16, b: u16) -> Option<Self> {
        let (min, max) = (a.min(b), a.max(b));
        (min < max).then_some(Self { min, max })
    }

    #[inline]
    fn span(&self) -> f32 {
        f32::from(self.max - self.min)
    }
}

/// A pedal or brake sensor.
///
/// `percent()` is clamped to `[0, 1]`; brake consumers that need to see
/// lock-up overtravel use [`CalibratedSensor::percent_with_overtravel`].
#[derive(Debug, Clone)]
pub struct CalibratedSensor {
    channel: AnalogChannel,
    spec: SensorSpec,
    raw: u16,
    calibration: Option<Calibration>,
    /// In-progress calibration window: running (min, max). Starts inverted
    /// (`min > max`) until the first sample arrives.
    window: Option<(u16, u16)>,
    power: IoStatus,
    signal: IoStatus,
    read: IoStatus,
}

impl CalibratedSensor {
    pub fn new(channel: AnalogChannel, spec: SensorSpec) -> Self {
        Self {
            channel,
            spec,
            raw: 0,
            calibration: None,
            window: None,
            power: IoStatus::Unknown,
            signal: IoStatus::Unknown,
            read: IoStatus::Unknown,
        }
    }

    pub fn with_calibration(mut self, calibration: Option<Calibration>) -> Self {
        self.calibration = calibration;
        self
    }

    #[inline]
    pub fn channel(&self) -> AnalogChannel {
        self.channel
    }

    #[inline]
    pub fn spec(&self) -> &SensorSpec {
        &self.spec
    }

    /// Power the sensor and configure its signal pin. Failures are recorded,
    /// never returned.
    pub fn init<I: Inputs + ?Sized>(&mut self, io: &mut I) {
        let r = io.power_init(self.channel);
        if let Err(e) = &r {
            tracing::warn!(channel = ?self.channel, error = %map_hw_error(&**e), "sensor power init failed");
        }
        self.power = IoStatus::from_result(&r);
        let r = io.signal_init(self.channel);
        if let Err(e) = &r {
            tracing::warn!(channel = ?self.channel, error = %map_hw_error(&**e), "sensor signal init failed");
        }
        self.signal = IoStatus::from_result(&r);
    }

    /// Sample once. On a failed read the previous raw value is kept but the
    /// read status is `Failed` for this cycle.
    pub fn sample<I: Inputs + ?Sized>(&mut self, io: &mut I) {
        match io.read_analog(self.channel) {
            Ok(raw) => {
                self.read = IoStatus::Ok;
                self.update(raw);
            }
            Err(e) => {
                self.read = IoStatus::Failed;
                tracing::trace!(channel = ?self.channel, error = %e, "sensor read failed");
            }
        }
    }

    /// Store a raw reading; while calibrating, widen the learned window.
    pub fn update(&mut self, raw: u16) {
        self.raw = raw;
        if let Some((lo, hi)) = self.window.as_mut() {
            *lo = (*lo).min(raw);
            *hi = (*hi).max(raw);
        }
    }

    #[inline]
    pub fn raw(&self) -> u16 {
        self.raw
    }

    #[inline]
    pub fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    #[inline]
    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// Raw reading outside the datasheet bounds (not the calibration bounds).
    pub fn out_of_range(&self) -> bool {
        self.raw < self.spec.spec_min || self.raw > self.spec.spec_max
    }

    pub fn power_status(&self) -> IoStatus {
        self.power
    }

    pub fn signal_status(&self) -> IoStatus {
        self.signal
    }

    pub fn read_status(&self) -> IoStatus {
        self.read
    }

    /// Open a calibration window. Only readings taken after this call count.
    pub fn begin_calibration(&mut self) {
        self.window = Some((u16::MAX, u16::MIN));
        tracing::info!(channel = ?self.channel, "calibration window opened");
    }

    pub fn is_calibrating(&self) -> bool {
        self.window.is_some()
    }

    /// Close the window. The learned span replaces the calibration only if it
    /// is non-empty; otherwise the previous calibration stays.
    pub fn end_calibration(&mut self) -> Option<Calibration> {
        let (lo, hi) = self.window.take()?;
        if lo > hi {
            tracing::warn!(channel = ?self.channel, "calibration window saw no samples");
            return None;
        }
        let learned = Calibration::new(lo, hi);
        match learned {
            Some(c) => {
                tracing::info!(channel = ?self.channel, min = c.min, max = c.max, "calibration learned");
                self.calibration = Some(c);
            }
            None => {
                tracing::warn!(channel = ?self.channel, value = lo, "calibration window saw no travel");
            }
        }
        learned
    }

    /// Unclamped travel fraction; `None` when uncalibrated.
    fn fraction(&self) -> Option<f32> {
        let c = self.calibration?;
        let raw = f32::from(self.raw);
        let travel = if self.spec.reversed {
            f32::from(c.max) - raw
        } else {
            raw - f32::from(c.min)
        };
        Some(travel / c.span())
    }

    /// Pedal travel in `[0, 1]`; 0 when not calibrated.
    pub fn percent(&self) -> f32 {
        self.fraction().map_or(0.0, |f| f.clamp(0.0, 1.0))
    }

    /// Pedal travel floored at 0 but allowed past 1.
    pub fn percent_with_overtravel(&self) -> f32 {
        self.fraction().map_or(0.0, |f| f.max(0.0))
    }
}

/// The four redundant pedal sensors, sampled together each cycle.
#[derive(Debug, Clone)]
pub struct PedalSensors {
    pub tps0: CalibratedSensor,
    pub tps1: CalibratedSensor,
    pub bps0: CalibratedSensor,
    pub bps1: CalibratedSensor,
}

impl PedalSensors {
    pub fn iter(&self) -> impl Iterator<Item = &CalibratedSensor> {
        [&self.tps0, &self.tps1, &self.bps0, &self.bps1].into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CalibratedSensor> {
        [&mut self.tps0, &mut self.tps1, &mut self.bps0, &mut self.bps1].into_iter()
    }

    /// Mean of both throttle sensors, `[0, 1]`.
    pub fn throttle(&self) -> f32 {
        (self.tps0.percent() + self.tps1.percent()) / 2.0
    }

    /// Mean of both brake sensors including overtravel.
    pub fn brake(&self) -> f32 {
        (self.bps0.percent_with_overtravel() + self.bps1.percent_with_overtravel()) / 2.0
    }
}
