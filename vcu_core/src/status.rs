//! Per-cycle report and transport bookkeeping.

use crate::error::TransportFault;
use crate::handshake::HandshakeStage;
use crate::safety::SafetyStatus;

/// Failure and traffic counts for one CAN channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelCounters {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub busy: u64,
    pub fifo_full: u64,
    pub stale: u64,
    pub bus_off: u64,
    pub other: u64,
    /// High-to-low mirror writes that failed (low channel only).
    pub mirror_failures: u64,
    /// Status polls issued after a bus-off.
    pub recovery_polls: u64,
}

impl ChannelCounters {
    pub fn record(&mut self, fault: TransportFault) {
        let slot = match fault {
            TransportFault::Busy => &mut self.busy,
            TransportFault::FifoFull => &mut self.fifo_full,
            TransportFault::StaleData => &mut self.stale,
            TransportFault::BusOff => &mut self.bus_off,
            TransportFault::Other => &mut self.other,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn failures(&self) -> u64 {
        self.busy + self.fifo_full + self.stale + self.bus_off + self.other
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportCounters {
    pub high: ChannelCounters,
    pub low: ChannelCounters,
}

/// What one call to `VcuCore::step` did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub now_ms: u64,
    pub stage: HandshakeStage,
    pub status: SafetyStatus,
    /// Torque placed in this cycle's control frame, dNm.
    pub torque_dnm: i16,
    pub control_sent: bool,
    pub frames_routed: usize,
    pub frames_mirrored: usize,
    pub broadcasts_sent: usize,
    /// A channel hit bus-off this cycle and a recovery poll was issued.
    pub bus_off_recovery: bool,
}
