use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

const SENSORS_FIXED: &str = r#"
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
calibration = [600, 4200]

[sensors.bps1]
spec_min = 500
spec_max = 4500
calibration = [600, 4200]
"#;

const SENSORS_UNCALIBRATED: &str = r#"
[sensors.tps0]
spec_min = 200
spec_max = 4800

[sensors.tps1]
spec_min = 200
spec_max = 4800
reversed = true

[sensors.bps0]
spec_min = 500
spec_max = 4500

[sensors.bps1]
spec_min = 500
spec_max = 4500
"#;

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("vcu.toml");
    fs::write(&path, body).unwrap();
    path
}

fn vcu(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("vcu").unwrap();
    cmd.arg("--log-level").arg("error").arg("--config").arg(cfg);
    cmd
}

/// Run with `--json` and parse the summary line.
fn run_json(cfg: &PathBuf, extra: &[&str]) -> serde_json::Value {
    let mut cmd = vcu(cfg);
    cmd.arg("--json").arg("run").args(extra);
    let out = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"final_stage\""))
        .unwrap_or_else(|| panic!("no summary line; stdout was: {stdout}"));
    serde_json::from_str(line).expect("valid JSON")
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run", "--cycles", "20"], 0, "Run finished: 20 cycles", "stdout")]
#[case(&["self-check"], 0, "Self-check OK: 5 ms cycle (200 Hz)", "stdout")]
#[case(&["run", "--throttle"], 2, "a value is required", "stderr")]
#[case(&["launch"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SENSORS_FIXED);

    let assert = vcu(&cfg).args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn simulated_car_reaches_driving_and_commands_torque() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SENSORS_FIXED);

    let v = run_json(&cfg, &["--cycles", "80", "--ready-at-ms", "50", "--throttle", "0.3"]);
    assert_eq!(v["final_stage"], "driving");
    assert_eq!(v["rtds_starts"], 1);
    assert_eq!(v["last_torque_dnm"], 300);
    assert_eq!(v["faults_seen"].as_array().map(Vec::len), Some(0));
    assert_eq!(v["inverter_timeouts"], 0);
    assert!(v["control_frames_sent"].as_u64().unwrap() > 0);
    assert!(v["can"]["low"]["sent"].as_u64().unwrap() >= 11);
}

#[rstest]
fn missing_calibration_is_learned_with_a_pedal_sweep() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SENSORS_UNCALIBRATED);

    let v = run_json(&cfg, &["--cycles", "200", "--ready-at-ms", "450"]);
    assert_eq!(v["calibrated_at_runtime"], true);
    assert_eq!(v["final_stage"], "driving");
    assert!(v["last_torque_dnm"].as_i64().unwrap() > 0);
    let faults: Vec<&str> = v["faults_seen"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f.as_str())
        .collect();
    assert!(faults.contains(&"TPS0_UNCALIBRATED"), "{faults:?}");
}

#[rstest]
fn interlock_drop_returns_to_idle_without_torque() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SENSORS_FIXED);

    let v = run_json(
        &cfg,
        &["--cycles", "80", "--ready-at-ms", "20", "--hvil-drop-at-ms", "200"],
    );
    assert_eq!(v["final_stage"], "idle");
    assert_eq!(v["last_torque_dnm"], 0);
}

#[rstest]
fn brake_with_throttle_latches_implausibility() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SENSORS_FIXED);

    let v = run_json(
        &cfg,
        &["--cycles", "80", "--ready-at-ms", "20", "--brake-at-ms", "200"],
    );
    let faults = v["faults_seen"].as_array().unwrap();
    assert!(faults.iter().any(|f| f == "BRAKE_THROTTLE_IMPLAUSIBLE"));
    assert_eq!(v["last_torque_dnm"], 0);
}

#[rstest]
fn bus_off_is_recovered_by_polling() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SENSORS_FIXED);

    let v = run_json(
        &cfg,
        &["--cycles", "80", "--ready-at-ms", "20", "--bus-off-at-ms", "100"],
    );
    assert!(v["can"]["high"]["recovery_polls"].as_u64().unwrap() >= 1);
    assert!(v["can"]["high"]["bus_off"].as_u64().unwrap() >= 1);
    assert_eq!(v["final_stage"], "driving");
}

#[rstest]
fn fifo_budget_overrun_is_a_config_error() {
    let dir = tempdir().unwrap();
    let body = format!("[can]\nmessage_object_budget = 64\n{SENSORS_FIXED}");
    let cfg = write_config(&dir, &body);

    vcu(&cfg)
        .arg("self-check")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("CAN FIFO depths do not fit"));
}

#[rstest]
fn json_mode_reports_config_errors_as_json() {
    let dir = tempdir().unwrap();
    let body = format!("[torque]\nmax_torque_nm = -5.0\n{SENSORS_FIXED}");
    let cfg = write_config(&dir, &body);

    let out = vcu(&cfg)
        .arg("--json")
        .arg("run")
        .assert()
        .code(3)
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_str(String::from_utf8_lossy(&out).trim()).unwrap();
    assert_eq!(v["reason"], "Config");
    assert!(v["message"].as_str().unwrap().contains("max_torque_nm"));
}

#[rstest]
fn missing_config_file_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("nope.toml");

    vcu(&cfg)
        .arg("self-check")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("could not be read"));
}

#[rstest]
fn health_reports_status_as_json() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SENSORS_FIXED);
    let out = vcu(&cfg).arg("health").assert().success().get_output().stdout.clone();
    let v: serde_json::Value = serde_json::from_str(String::from_utf8_lossy(&out).trim()).unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["fifo_objects"], 96);

    let bad = dir.path().join("missing.toml");
    vcu(&bad)
        .arg("health")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"status\":\"error\""));
}
