use rstest::rstest;
use vcu_config::{Direction, load_file, load_toml};

const BASE: &str = r#"
[cycle]
period_ms = 5
max_frames_per_cycle = 25

[can]
message_object_budget = 128
sensor_broadcast_base_id = 0x500

[can.high]
bitrate_kbps = 500
read_fifo_depth = 32
write_fifo_depth = 16

[can.low]
bitrate_kbps = 250
read_fifo_depth = 8
write_fifo_depth = 40

[sensors.tps0]
spec_min = 200
spec_max = 4800
calibration = [500, 4500]

[sensors.tps1]
spec_min = 200
spec_max = 4800
calibration = [4500, 500]
reversed = true

[sensors.bps0]
spec_min = 500
spec_max = 4500

[sensors.bps1]
spec_min = 500
spec_max = 4500

[torque]
max_torque_nm = 120.0
direction = "reverse"

[[schedule]]
id = 0xC0
min_interval_ms = 10
max_interval_ms = 125
required = true
"#;

#[test]
fn accepts_full_config() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.can.low.bitrate_kbps, 250);
    assert_eq!(cfg.sensors.tps1.calibration, Some([4500, 500]));
    assert!(cfg.sensors.tps1.reversed);
    assert_eq!(cfg.torque.direction, Direction::Reverse);
    assert_eq!(cfg.schedule.len(), 1);
    assert!(cfg.schedule[0].required);
}

#[rstest]
#[case("period_ms = 5", "period_ms = 0", "period_ms must be >= 1")]
#[case("bitrate_kbps = 250", "bitrate_kbps = 333", "bitrate_kbps must be one of")]
#[case("write_fifo_depth = 40", "write_fifo_depth = 90", "message objects, budget is 128")]
#[case("calibration = [500, 4500]", "calibration = [100, 4500]", "within spec bounds")]
#[case("max_interval_ms = 125", "max_interval_ms = 5", "min_interval_ms must be <= max_interval_ms")]
#[case("max_torque_nm = 120.0", "max_torque_nm = -1.0", "max_torque_nm must be > 0")]
fn rejects_invalid_values(#[case] from: &str, #[case] to: &str, #[case] needle: &str) {
    let text = BASE.replacen(from, to, 1);
    assert_ne!(text, BASE, "replacement did not apply");
    let cfg = load_toml(&text).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "error `{err}` does not mention `{needle}`"
    );
}

#[test]
fn rejects_duplicate_schedule_ids() {
    let text = format!(
        "{BASE}\n[[schedule]]\nid = 0xC0\nmin_interval_ms = 0\nmax_interval_ms = 100\n"
    );
    let cfg = load_toml(&text).expect("parse TOML");
    let err = cfg.validate().expect_err("duplicate id");
    assert!(format!("{err}").contains("listed twice"));
}

#[test]
fn same_number_in_both_formats_is_two_schedule_entries() {
    let text = format!(
        "{BASE}\n[[schedule]]\nid = 0x123\nmin_interval_ms = 0\nmax_interval_ms = 100\n\n[[schedule]]\nid = 0x123\nextended = true\nmin_interval_ms = 0\nmax_interval_ms = 100\n"
    );
    let cfg = load_toml(&text).expect("parse TOML");
    cfg.validate().expect("standard and extended 0x123 are distinct");
}

#[test]
fn standard_schedule_id_must_fit_11_bits() {
    let text = format!("{BASE}\n[[schedule]]\nid = 0x800\nmin_interval_ms = 0\nmax_interval_ms = 100\n");
    let err = load_toml(&text).expect("parse TOML").validate().expect_err("12-bit standard id");
    assert!(format!("{err}").contains("extended = true"));
}

#[test]
fn rejects_inverted_derate_band() {
    let text = format!("{BASE}\n[[safety.derate]]\nkind = \"power\"\nstart_kw = 80.0\ncap_kw = 75.0\n");
    let cfg = load_toml(&text).expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn unknown_direction_is_a_parse_error() {
    let text = BASE.replace("\"reverse\"", "\"sideways\"");
    assert!(load_toml(&text).is_err());
}

#[test]
fn empty_file_uses_defaults() {
    let cfg = load_toml("").expect("parse empty");
    cfg.validate().expect("defaults valid");
    assert_eq!(cfg.cycle.period_ms, 5);
    assert_eq!(cfg.cycle.max_frames_per_cycle, 25);
    assert!(cfg.sensors.tps0.calibration.is_none());
}

#[test]
fn load_file_reports_path_on_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vcu.toml");
    std::fs::write(&path, "[cycle]\nperiod_ms = \"fast\"\n").expect("write");
    let err = load_file(&path).expect_err("bad type");
    assert!(format!("{err}").contains("vcu.toml"));
}
