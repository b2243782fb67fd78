use vcu_core::error::BuildError;
use vcu_core::mocks::{NullOutputs, RecordingCan, StaticInputs};
use vcu_core::{
    CycleCfg, HandshakeCfg, MessageId, PedalSetup, SafetyCfg, ScheduleRule, SensorSetup,
    TorqueCfg, Vcu, VcuSettings, build_vcu,
};
use rstest::rstest;

fn build_error(err: &eyre::Report) -> &BuildError {
    err.downcast_ref::<BuildError>()
        .unwrap_or_else(|| panic!("expected BuildError, got: {err:?}"))
}

#[rstest]
fn builder_missing_inputs_yields_typed_build_error() {
    let err = Vcu::builder()
        .with_outputs(NullOutputs::default())
        .with_high_channel(RecordingCan::default())
        .with_low_channel(RecordingCan::default())
        .try_build()
        .expect_err("should fail with MissingInputs");
    assert!(matches!(build_error(&err), BuildError::MissingInputs));
}

#[rstest]
fn builder_missing_low_channel_yields_typed_build_error() {
    let err = Vcu::builder()
        .with_inputs(StaticInputs::default())
        .with_outputs(NullOutputs::default())
        .with_high_channel(RecordingCan::default())
        .try_build()
        .expect_err("should fail with MissingLowChannel");
    assert!(matches!(build_error(&err), BuildError::MissingLowChannel));
}

#[rstest]
fn builder_missing_high_channel_is_reported_before_low() {
    let err = Vcu::builder()
        .with_inputs(StaticInputs::default())
        .with_outputs(NullOutputs::default())
        .try_build()
        .expect_err("should fail with MissingHighChannel");
    assert!(matches!(build_error(&err), BuildError::MissingHighChannel));
}

#[rstest]
fn complete_builder_steps() {
    let mut vcu = Vcu::builder()
        .with_inputs(StaticInputs::default())
        .with_outputs(NullOutputs::default())
        .with_high_channel(RecordingCan::default())
        .with_low_channel(RecordingCan::default())
        .build()
        .expect("defaults are valid");
    let r = vcu.step();
    assert!(r.control_sent);
    assert_eq!(vcu.counters().high.frames_sent, 1);
}

fn with(f: impl FnOnce(&mut VcuSettings)) -> VcuSettings {
    let mut s = VcuSettings::default();
    f(&mut s);
    s
}

#[rstest]
#[case::zero_period(with(|s| s.cycle = CycleCfg { period_ms: 0, ..CycleCfg::default() }))]
#[case::zero_frame_budget(with(|s| s.cycle.max_frames_per_cycle = 0))]
#[case::broadcast_past_eleven_bits(with(|s| s.cycle.broadcast_base_id = 0x7F8))]
#[case::zero_torque(with(|s| s.torque = TorqueCfg { max_torque_nm: 0.0, ..TorqueCfg::default() }))]
#[case::nan_torque(with(|s| s.torque.max_torque_nm = f32::NAN))]
#[case::torque_overflows_frame(with(|s| s.torque.max_torque_nm = 5000.0))]
#[case::inverted_spec(with(|s| s.pedals = PedalSetup { tps0: SensorSetup::new(4800, 200, false), ..PedalSetup::default() }))]
#[case::calibration_outside_spec(with(|s| s.pedals.bps0 = SensorSetup::new(500, 4500, false).calibrated(100, 4000)))]
#[case::fraction_above_one(with(|s| s.safety = SafetyCfg { tps_discrepancy: 1.5, ..SafetyCfg::default() }))]
#[case::clear_above_trip(with(|s| s.safety.implausible_clear_throttle = 0.5))]
#[case::ready_threshold_negative(with(|s| s.handshake = HandshakeCfg { ready_throttle_max: -0.1, ..HandshakeCfg::default() }))]
#[case::loud_rtds(with(|s| s.handshake.rtds_amplitude_pct = 150))]
#[case::inverted_schedule(with(|s| s.schedule.push((MessageId::standard(0x123), ScheduleRule::new(200, 100, false)))))]
fn invalid_settings_are_rejected(#[case] settings: VcuSettings) {
    let err = build_vcu(
        StaticInputs::default(),
        NullOutputs::default(),
        RecordingCan::default(),
        RecordingCan::default(),
        settings,
        None,
    )
    .expect_err("settings should be rejected");
    assert!(
        matches!(build_error(&err), BuildError::InvalidConfig(_)),
        "got {err}"
    );
}

#[rstest]
fn broadcast_base_at_the_top_of_the_range_is_accepted() {
    let settings = with(|s| s.cycle.broadcast_base_id = 0x7F5);
    let core = build_vcu(
        StaticInputs::default(),
        NullOutputs::default(),
        RecordingCan::default(),
        RecordingCan::default(),
        settings,
        None,
    )
    .expect("0x7F5 + 10 = 0x7FF fits");
    assert_eq!(core.scheduler().rule_for(MessageId::standard(0x7FF)).max_interval_ms, 1000);
}
