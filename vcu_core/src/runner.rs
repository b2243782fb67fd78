//! Fixed-period cycle loop.
//!
//! Pacing is a deadline-bounded wait on the core's clock: each cycle starts
//! one period after the previous deadline. A cycle that finishes past its
//! deadline is an overrun; the schedule then re-anchors on the current time
//! instead of bursting to catch up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use vcu_traits::{CanTransport, Inputs, Outputs};

use crate::core::VcuCore;
use crate::handshake::HandshakeStage;
use crate::safety::Faults;
use crate::status::{CycleReport, TransportCounters};
use crate::util::wait_until;

/// Cycle execution times, microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleStats {
    pub cycles: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub total_us: u64,
    pub overruns: u64,
    pub worst_lateness_us: u64,
}

impl CycleStats {
    pub fn record(&mut self, took: Duration) {
        let us = u64::try_from(took.as_micros()).unwrap_or(u64::MAX);
        self.min_us = if self.cycles == 0 { us } else { self.min_us.min(us) };
        self.max_us = self.max_us.max(us);
        self.total_us = self.total_us.saturating_add(us);
        self.cycles += 1;
    }

    pub fn record_overrun(&mut self, late: Duration) {
        self.overruns += 1;
        let us = u64::try_from(late.as_micros()).unwrap_or(u64::MAX);
        self.worst_lateness_us = self.worst_lateness_us.max(us);
    }

    pub fn avg_us(&self) -> u64 {
        self.total_us.checked_div(self.cycles).unwrap_or(0)
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub cycles: u64,
    pub final_stage: HandshakeStage,
    /// Every fault bit seen at any point during the run.
    pub faults_seen: Faults,
    pub control_frames_sent: u64,
    pub stats: CycleStats,
    pub counters: TransportCounters,
    pub output_failures: u64,
    pub stopped_by_signal: bool,
}

/// Run cycles until `max_cycles` (if any) or until `shutdown` is set.
///
/// `after_cycle` runs inside the cycle budget after each step; a simulator
/// uses it to advance other nodes on the bus.
pub fn run<I, O, H, L, F>(
    core: &mut VcuCore<I, O, H, L>,
    max_cycles: Option<u64>,
    shutdown: &AtomicBool,
    mut after_cycle: F,
) -> RunSummary
where
    I: Inputs,
    O: Outputs,
    H: CanTransport,
    L: CanTransport,
    F: FnMut(&mut VcuCore<I, O, H, L>, &CycleReport),
{
    let clock = core.clock().clone();
    let period = Duration::from_millis(core.cycle_cfg().period_ms.max(1));
    let mut stats = CycleStats::default();
    let mut faults_seen = Faults::empty();
    let mut control_frames_sent = 0u64;
    let mut stopped_by_signal = false;

    tracing::info!(period_ms = period.as_millis() as u64, ?max_cycles, "run start");
    let mut deadline: Instant = clock.now() + period;
    loop {
        if max_cycles.is_some_and(|n| stats.cycles >= n) {
            break;
        }
        if shutdown.load(Ordering::Relaxed) {
            stopped_by_signal = true;
            break;
        }

        let started = clock.now();
        let report = core.step();
        after_cycle(core, &report);
        stats.record(clock.now().saturating_duration_since(started));
        faults_seen |= report.status.faults;
        control_frames_sent += u64::from(report.control_sent);

        let late = wait_until(&*clock, deadline);
        if late.is_zero() {
            deadline += period;
        } else {
            stats.record_overrun(late);
            tracing::warn!(late_us = late.as_micros() as u64, cycle = stats.cycles, "cycle overrun");
            deadline = clock.now() + period;
        }
    }

    let summary = RunSummary {
        cycles: stats.cycles,
        final_stage: core.stage(),
        faults_seen,
        control_frames_sent,
        stats,
        counters: *core.counters(),
        output_failures: core.output_failures(),
        stopped_by_signal,
    };
    tracing::info!(
        cycles = summary.cycles,
        stage = %summary.final_stage,
        overruns = summary.stats.overruns,
        avg_us = summary.stats.avg_us(),
        "run stop"
    );
    summary
}
