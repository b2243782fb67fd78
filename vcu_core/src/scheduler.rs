//! Per-identifier send throttling and keep-alive.
//!
//! Decision order for an identifier with history: too soon after the last
//! send → hold; payload changed → send; older than `max_interval` → send;
//! otherwise hold. An identifier with no history always sends. History is
//! only updated by [`MessageScheduler::record_sent`], so a failed write
//! leaves the entry untouched and the next cycle retries.
//!
//! Identifiers are keyed together with their frame format: standard `0xC0`
//! and extended `0xC0` are two messages with two histories.

use std::collections::BTreeMap;

use vcu_traits::frame::MAX_DLC;
use vcu_traits::{CanFrame, CanTransport, FrameFormat};

use crate::error::TransportFault;
use crate::hw_error::transport_fault;

/// Send discipline for one identifier, `min_interval_ms <= max_interval_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRule {
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    /// The consumer treats silence longer than `max_interval_ms` as a fault.
    pub required: bool,
}

impl ScheduleRule {
    pub const fn new(min_interval_ms: u64, max_interval_ms: u64, required: bool) -> Self {
        Self {
            min_interval_ms,
            max_interval_ms,
            required,
        }
    }
}

/// Motor controller command keep-alive.
pub const CONTROL_RULE: ScheduleRule = ScheduleRule::new(10, 125, true);
/// Logging-channel sensor broadcasts.
pub const BROADCAST_RULE: ScheduleRule = ScheduleRule::new(50, 1000, false);
/// Anything without a rule of its own.
pub const FALLBACK_RULE: ScheduleRule = ScheduleRule::new(0, 1000, false);

/// Outbound message identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId {
    pub format: FrameFormat,
    pub id: u32,
}

impl MessageId {
    pub const fn standard(id: u32) -> Self {
        Self {
            format: FrameFormat::Standard,
            id,
        }
    }

    pub const fn extended(id: u32) -> Self {
        Self {
            format: FrameFormat::Extended,
            id,
        }
    }

    pub fn of(frame: &CanFrame) -> Self {
        Self {
            format: frame.format(),
            id: frame.id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub key: MessageId,
    pub rule: ScheduleRule,
    /// `None` until the first successful send.
    pub last_sent_ms: Option<u64>,
    last_len: u8,
    last_payload: [u8; MAX_DLC],
    pub sends: u64,
}

impl ScheduleEntry {
    fn new(key: MessageId, rule: ScheduleRule) -> Self {
        Self {
            key,
            rule,
            last_sent_ms: None,
            last_len: 0,
            last_payload: [0; MAX_DLC],
            sends: 0,
        }
    }

    pub fn last_payload(&self) -> &[u8] {
        &self.last_payload[..usize::from(self.last_len)]
    }

    fn payload_changed(&self, payload: &[u8]) -> bool {
        self.last_payload() != payload
    }
}

/// Result of offering a frame to a transport through the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Written and recorded.
    Sent,
    /// Throttled; nothing written.
    Held,
    /// Write failed; history untouched so the next cycle retries.
    Failed(TransportFault),
}

/// Per-identifier send history. Single writer: the cycle that owns it.
#[derive(Debug, Clone, Default)]
pub struct MessageScheduler {
    rules: BTreeMap<MessageId, ScheduleRule>,
    fallback: Option<ScheduleRule>,
    entries: BTreeMap<MessageId, ScheduleEntry>,
}

impl MessageScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rule used when `key` is first seen. Rules for messages
    /// already tracked also replace the live entry's rule.
    pub fn set_rule(&mut self, key: MessageId, rule: ScheduleRule) {
        debug_assert!(rule.min_interval_ms <= rule.max_interval_ms);
        self.rules.insert(key, rule);
        if let Some(e) = self.entries.get_mut(&key) {
            e.rule = rule;
        }
    }

    pub fn set_fallback(&mut self, rule: ScheduleRule) {
        self.fallback = Some(rule);
    }

    pub fn rule_for(&self, key: MessageId) -> ScheduleRule {
        self.rules
            .get(&key)
            .copied()
            .or(self.fallback)
            .unwrap_or(FALLBACK_RULE)
    }

    /// Whether a frame with `payload` may go out as `key` at `now_ms`.
    pub fn should_send(&mut self, key: MessageId, payload: &[u8], now_ms: u64) -> bool {
        let rule = self.rule_for(key);
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| ScheduleEntry::new(key, rule));
        let Some(last) = entry.last_sent_ms else {
            return true;
        };
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < entry.rule.min_interval_ms {
            return false;
        }
        if entry.payload_changed(payload) {
            return true;
        }
        elapsed >= entry.rule.max_interval_ms
    }

    /// Record a successful transmission of `payload` as `key` at `now_ms`.
    pub fn record_sent(&mut self, key: MessageId, payload: &[u8], now_ms: u64) {
        let rule = self.rule_for(key);
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| ScheduleEntry::new(key, rule));
        let n = payload.len().min(MAX_DLC);
        entry.last_payload = [0; MAX_DLC];
        entry.last_payload[..n].copy_from_slice(&payload[..n]);
        entry.last_len = n as u8;
        entry.last_sent_ms = Some(now_ms);
        entry.sends += 1;
    }

    /// Decide, write, and record in one step.
    pub fn offer<T: CanTransport + ?Sized>(
        &mut self,
        frame: &CanFrame,
        transport: &mut T,
        now_ms: u64,
    ) -> Offer {
        let key = MessageId::of(frame);
        if !self.should_send(key, frame.data(), now_ms) {
            tracing::trace!(id = frame.id(), "held by scheduler");
            return Offer::Held;
        }
        match transport.transmit(frame) {
            Ok(()) => {
                self.record_sent(key, frame.data(), now_ms);
                Offer::Sent
            }
            Err(e) => {
                let fault = transport_fault(&*e);
                tracing::debug!(id = frame.id(), error = %e, ?fault, "transmit failed, retrying next cycle");
                Offer::Failed(fault)
            }
        }
    }

    pub fn entry(&self, key: MessageId) -> Option<&ScheduleEntry> {
        self.entries.get(&key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries.values()
    }

    /// Required identifiers whose last send is older than their max interval.
    pub fn overdue(&self, now_ms: u64) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries.values().filter(move |e| {
            e.rule.required
                && e.last_sent_ms
                    .is_none_or(|t| now_ms.saturating_sub(t) > e.rule.max_interval_ms)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const C0: MessageId = MessageId::standard(0xC0);
    const X10: MessageId = MessageId::standard(0x10);
    const X300: MessageId = MessageId::standard(0x300);

    fn sched() -> MessageScheduler {
        let mut s = MessageScheduler::new();
        s.set_rule(C0, CONTROL_RULE);
        s
    }

    #[test]
    fn unknown_id_sends_and_creates_entry() {
        let mut s = sched();
        assert!(s.entry(X10).is_none());
        assert!(s.should_send(X10, &[1], 0));
        let e = s.entry(X10).unwrap();
        assert_eq!(e.rule, FALLBACK_RULE);
        assert_eq!(e.last_sent_ms, None);
    }

    #[test]
    fn min_interval_beats_changed_payload() {
        let mut s = sched();
        s.record_sent(C0, &[0], 100);
        assert!(!s.should_send(C0, &[9], 105));
        assert!(s.should_send(C0, &[9], 110));
    }

    #[test]
    fn unchanged_payload_waits_for_max_interval() {
        let mut s = sched();
        s.record_sent(C0, &[0; 8], 0);
        assert!(!s.should_send(C0, &[0; 8], 124));
        assert!(s.should_send(C0, &[0; 8], 125));
    }

    #[test]
    fn shorter_payload_counts_as_change() {
        let mut s = sched();
        s.record_sent(C0, &[0, 0], 0);
        assert!(s.should_send(C0, &[0], 10));
    }

    #[test]
    fn unsent_entry_keeps_retrying() {
        let mut s = sched();
        assert!(s.should_send(C0, &[1], 0));
        // write failed: no record_sent
        assert!(s.should_send(C0, &[1], 1));
    }

    #[test]
    fn configured_fallback_replaces_builtin() {
        let mut s = MessageScheduler::new();
        s.set_fallback(ScheduleRule::new(20, 40, false));
        s.record_sent(X300, &[1], 0);
        assert!(!s.should_send(X300, &[2], 19));
        assert!(s.should_send(X300, &[1], 40));
    }

    #[test]
    fn overdue_lists_only_required() {
        let mut s = sched();
        s.record_sent(C0, &[0], 0);
        s.record_sent(X10, &[0], 0);
        assert_eq!(s.overdue(125).count(), 0);
        let keys: Vec<MessageId> = s.overdue(126).map(|e| e.key).collect();
        assert_eq!(keys, vec![C0]);
    }

    #[test]
    fn standard_and_extended_keep_separate_histories() {
        let mut s = sched();
        let ext = MessageId::extended(0xC0);
        s.record_sent(C0, &[1], 0);
        assert!(s.should_send(ext, &[1], 5));
        assert_eq!(s.entry(ext).map(|e| e.rule), Some(FALLBACK_RULE));
        s.record_sent(ext, &[1], 5);
        assert!(!s.should_send(C0, &[2], 6));
        assert_eq!(s.entry(C0).map(|e| e.sends), Some(1));
    }

    #[test]
    fn offer_keys_by_frame_format() {
        use vcu_hardware::{BusChannel, SimulatedBus};

        let bus = SimulatedBus::new((8, 8), (8, 8));
        let mut port = bus.port(BusChannel::High);
        let mut s = sched();
        let std = CanFrame::standard(0xC0, &[1]).unwrap();
        let ext = CanFrame::new(0xC0, FrameFormat::Extended, &[1]).unwrap();
        assert_eq!(s.offer(&std, &mut port, 0), Offer::Sent);
        assert_eq!(s.offer(&ext, &mut port, 1), Offer::Sent);
        assert_eq!(s.offer(&std, &mut port, 2), Offer::Held);
        assert_eq!(bus.flush(BusChannel::High).len(), 2);
    }
}
