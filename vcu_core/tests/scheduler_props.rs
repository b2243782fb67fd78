use proptest::prelude::*;
use vcu_core::{MessageId, MessageScheduler, ScheduleRule};

const ID: MessageId = MessageId::standard(0x123);

#[derive(Debug, Clone, Copy)]
struct Tick {
    dt_ms: u64,
    change: bool,
    write_fails: bool,
}

prop_compose! {
    fn rule_strategy()(min in 0u64..50, extra in 0u64..500, required in any::<bool>()) -> ScheduleRule {
        ScheduleRule::new(min, min + extra, required)
    }
}

prop_compose! {
    fn tick_strategy(max_dt: u64, fail_weight: u32)(
        dt_ms in 0..=max_dt,
        change in any::<bool>(),
        fail in 0u32..100,
    ) -> Tick {
        Tick { dt_ms, change, write_fails: fail < fail_weight }
    }
}

/// Drive a scheduler the way the cycle does; returns the send timestamps.
fn simulate(rule: ScheduleRule, ticks: &[Tick]) -> Vec<u64> {
    let mut s = MessageScheduler::new();
    s.set_rule(ID, rule);
    let mut now = 0u64;
    let mut payload = [0u8; 8];
    let mut sent = Vec::new();
    for t in ticks {
        now += t.dt_ms;
        if t.change {
            payload[0] = payload[0].wrapping_add(1);
        }
        if s.should_send(ID, &payload, now) && !t.write_fails {
            s.record_sent(ID, &payload, now);
            sent.push(now);
        }
    }
    sent
}

proptest! {
    #[test]
    fn sends_are_never_closer_than_min_interval(
        rule in rule_strategy(),
        ticks in prop::collection::vec(tick_strategy(30, 20), 1..300),
    ) {
        let sent = simulate(rule, &ticks);
        for w in sent.windows(2) {
            prop_assert!(w[1] - w[0] >= rule.min_interval_ms, "gap {} < min {}", w[1] - w[0], rule.min_interval_ms);
        }
    }

    #[test]
    fn required_frames_never_exceed_max_interval_at_fixed_period(
        period in prop::sample::select(vec![1u64, 5, 25]),
        changes in prop::collection::vec(any::<bool>(), 10..400),
    ) {
        // 0xC0 discipline; each period divides 125
        let rule = ScheduleRule::new(10, 125, true);
        let ticks: Vec<Tick> = changes
            .iter()
            .map(|&change| Tick { dt_ms: period, change, write_fails: false })
            .collect();
        let sent = simulate(rule, &ticks);
        prop_assert!(!sent.is_empty());
        for w in sent.windows(2) {
            prop_assert!(w[1] - w[0] <= rule.max_interval_ms, "gap {} > max", w[1] - w[0]);
        }
        // tail: no silence longer than max at the end of the run either
        let end = period * ticks.len() as u64;
        prop_assert!(end - sent[sent.len() - 1] < rule.max_interval_ms + period);
    }

    #[test]
    fn keep_alive_lag_is_bounded_by_one_step(
        rule in rule_strategy(),
        ticks in prop::collection::vec(tick_strategy(20, 0), 2..300),
    ) {
        let sent = simulate(rule, &ticks);
        let max_dt = ticks.iter().map(|t| t.dt_ms).max().unwrap_or(0);
        for w in sent.windows(2) {
            prop_assert!(w[1] - w[0] <= rule.max_interval_ms + max_dt);
        }
    }

    #[test]
    fn failed_writes_leave_history_untouched(
        rule in rule_strategy(),
        now in 0u64..10_000,
    ) {
        let mut s = MessageScheduler::new();
        s.set_rule(ID, rule);
        prop_assert!(s.should_send(ID, &[1, 2, 3], now));
        // transport failed: nothing recorded
        prop_assert!(s.should_send(ID, &[1, 2, 3], now));
        prop_assert_eq!(s.entry(ID).and_then(|e| e.last_sent_ms), None);
    }
}
