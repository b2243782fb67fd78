use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use vcu_core::mocks::{NullOutputs, RecordingCan, StaticInputs};
use vcu_core::scheduler::CONTROL_RULE;
use vcu_core::{MessageId, MessageScheduler, PedalSetup, SensorSetup, VcuSettings, build_vcu};
use vcu_traits::{AnalogChannel, CanFrame};

fn tuned(c: &mut Criterion, name: &str) -> criterion::BenchmarkGroup<'_, criterion::measurement::WallTime> {
    let mut g = c.benchmark_group(name);
    // BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p vcu_core --bench cycle
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(10));
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }
    g
}

pub fn bench_scheduler(c: &mut Criterion) {
    let mut g = tuned(c, "scheduler");
    let mut s = MessageScheduler::new();
    let control = MessageId::standard(0xC0);
    s.set_rule(control, CONTROL_RULE);
    let payloads: Vec<[u8; 8]> = (0u8..32).map(|i| [i / 4, 0, 0, 0, 0, 1, 0, 0]).collect();
    let mut now = 0u64;
    g.bench_function("should_send_and_record", |b| {
        b.iter(|| {
            now += 5;
            let p = &payloads[(now / 5) as usize % payloads.len()];
            if s.should_send(control, black_box(p), now) {
                s.record_sent(control, p, now);
            }
        })
    });
    g.finish();
}

fn inbox() -> std::collections::VecDeque<CanFrame> {
    (0..20u16)
        .filter_map(|i| CanFrame::standard(0xA0 + (i % 13), &[i as u8; 8]).ok())
        .collect()
}

pub fn bench_cycle(c: &mut Criterion) {
    let mut g = tuned(c, "cycle");
    let settings = || VcuSettings {
        pedals: PedalSetup {
            tps0: SensorSetup::new(200, 4800, false).calibrated(500, 4500),
            tps1: SensorSetup::new(200, 4800, true).calibrated(500, 4500),
            bps0: SensorSetup::new(200, 4800, false).calibrated(500, 4500),
            bps1: SensorSetup::new(200, 4800, false).calibrated(500, 4500),
        },
        ..VcuSettings::default()
    };
    let mut inputs = StaticInputs { hvil: true, ..StaticInputs::default() };
    inputs
        .set(AnalogChannel::Tps0, 2500)
        .set(AnalogChannel::Tps1, 2500)
        .set(AnalogChannel::Bps0, 600)
        .set(AnalogChannel::Bps1, 600)
        .set(AnalogChannel::LvBattery, 13_200);

    g.bench_function("step_with_20_inbound", |b| {
        b.iter_batched(
            || {
                let high = RecordingCan { inbox: inbox(), ..RecordingCan::default() };
                build_vcu(
                    inputs.clone(),
                    NullOutputs::default(),
                    high,
                    RecordingCan::default(),
                    settings(),
                    None,
                )
                .expect("valid settings")
            },
            |mut core| {
                let r = core.step();
                black_box(r);
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(benches, bench_scheduler, bench_cycle);
criterion_main!(benches);
