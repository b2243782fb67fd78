//! Inbound demultiplexer and high-to-low mirror.

use vcu_traits::{CanFrame, CanTransport};

use crate::error::TransportFault;
use crate::hw_error::transport_fault;
use crate::status::ChannelCounters;
use crate::telemetry::{BatteryTelemetry, DeviceState, MotorControllerTelemetry};

/// Where a frame ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    MotorController,
    Battery,
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub received: usize,
    pub mirrored: usize,
    /// The high channel stopped the drain with this fault.
    pub fault: Option<TransportFault>,
}

/// Sole writer of [`DeviceState`].
#[derive(Debug, Clone)]
pub struct CanFrameRouter {
    state: DeviceState,
    max_frames_per_cycle: usize,
    ignored: u64,
}

impl CanFrameRouter {
    pub fn new(max_frames_per_cycle: usize) -> Self {
        Self {
            state: DeviceState::default(),
            max_frames_per_cycle: max_frames_per_cycle.max(1),
            ignored: 0,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Frames whose identifier nobody decodes.
    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    /// Decode one inbound frame into device state. Unknown identifiers and
    /// extended frames are counted and otherwise ignored.
    pub fn route(&mut self, frame: &CanFrame) -> Route {
        if MotorControllerTelemetry::owns(frame) && self.state.mcu.apply(frame) {
            Route::MotorController
        } else if BatteryTelemetry::owns(frame) && self.state.bms.apply(frame) {
            Route::Battery
        } else {
            self.ignored += 1;
            tracing::trace!(id = frame.id(), format = ?frame.format(), "ignoring frame");
            Route::Ignored
        }
    }

    /// Pull up to the per-cycle batch from `high`, route each frame, and copy
    /// it unmodified onto `low`. Mirroring bypasses the scheduler.
    pub fn drain<H, L>(
        &mut self,
        high: &mut H,
        low: &mut L,
        high_counters: &mut ChannelCounters,
        low_counters: &mut ChannelCounters,
    ) -> DrainReport
    where
        H: CanTransport + ?Sized,
        L: CanTransport + ?Sized,
    {
        let mut report = DrainReport::default();
        for _ in 0..self.max_frames_per_cycle {
            let frame = match high.receive() {
                Ok(Some(f)) => f,
                Ok(None) => break,
                Err(e) => {
                    let fault = transport_fault(&*e);
                    high_counters.record(fault);
                    if fault == TransportFault::StaleData {
                        // frame dropped by the controller, keep draining
                        continue;
                    }
                    tracing::warn!(error = %e, ?fault, "high channel receive failed");
                    report.fault = Some(fault);
                    break;
                }
            };
            report.received += 1;
            high_counters.frames_received += 1;
            self.route(&frame);

            match low.transmit(&frame) {
                Ok(()) => {
                    report.mirrored += 1;
                    low_counters.frames_sent += 1;
                }
                Err(e) => {
                    low_counters.mirror_failures += 1;
                    low_counters.record(transport_fault(&*e));
                    tracing::trace!(id = frame.id(), error = %e, "mirror write failed");
                }
            }
        }
        report
    }
}
