mod cli;
mod error_fmt;
mod rt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use serde_json::json;
use tracing_subscriber::{EnvFilter, Layer as _, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{ConfigError, exit_code_for_error, format_error_json, humanize};
use crate::run::{RunOutcome, run_sim};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            println!("{}", humanize(&err));
            eprintln!("error: {err:#}");
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    match cli.cmd {
        // Health never fails on a bad config; it reports it.
        Commands::Health => {
            init_tracing(cli.json, "error", None)?;
            health(&cli.config)
        }
        Commands::SelfCheck => {
            let cfg = setup(&cli.config, cli.json, &cli.log_level)?;
            self_check(&cfg, cli.json)
        }
        Commands::Run(args) => {
            let cfg = setup(&cli.config, cli.json, &cli.log_level)?;
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("install Ctrl-C handler")?;
            let outcome = run_sim(&cfg, &args, shutdown)?;
            report_run(&outcome, cli.json);
            Ok(())
        }
    }
}

/// Load the config, then install logging (the config may name a log file).
fn setup(path: &Path, json: bool, log_level: &str) -> eyre::Result<vcu_config::Config> {
    let loaded = load_config(path);
    let logging = loaded.as_ref().ok().map(|c| &c.logging);
    let level = logging
        .and_then(|l| l.level.as_deref())
        .filter(|_| log_level == "info")
        .unwrap_or(log_level);
    init_tracing(json, level, logging)?;
    loaded
}

fn load_config(path: &Path) -> eyre::Result<vcu_config::Config> {
    let cfg = vcu_config::load_file(path).wrap_err(ConfigError)?;
    cfg.validate().wrap_err(ConfigError)?;
    Ok(cfg)
}

fn init_tracing(json: bool, level: &str, logging: Option<&vcu_config::Logging>) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    // Console logs go to stderr so stdout stays machine-readable.
    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_target(false).with_writer(std::io::stderr).boxed()
    };

    let file = match logging.and_then(|l| l.file.as_deref()) {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().map_or_else(|| "vcu.log".into(), |n| n.to_os_string());
            let appender = match logging.and_then(|l| l.rotation.as_deref()) {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")
}

fn fifo_objects(cfg: &vcu_config::Config) -> u32 {
    let c = &cfg.can;
    [c.high.read_fifo_depth, c.high.write_fifo_depth, c.low.read_fifo_depth, c.low.write_fifo_depth]
        .into_iter()
        .map(u32::from)
        .sum()
}

fn self_check(cfg: &vcu_config::Config, json: bool) -> eyre::Result<()> {
    // Assemble once against the simulated bus so builder validation runs too.
    let bus = vcu_hardware::SimulatedBus::new((1, 1), (1, 1));
    let core = vcu_core::build_vcu(
        vcu_hardware::SimulatedInputs::new(),
        vcu_hardware::SimulatedOutputs::new(),
        bus.port(vcu_hardware::BusChannel::High),
        bus.port(vcu_hardware::BusChannel::Low),
        vcu_core::VcuSettings::from(cfg),
        None,
    )?;
    let period_ms = core.cycle_cfg().period_ms;
    let rate_hz = vcu_core::util::rate_hz(period_ms);
    let used = fifo_objects(cfg);
    let budget = cfg.can.message_object_budget;
    let s = &cfg.sensors;
    let runtime_calibration: Vec<&str> = [("tps0", &s.tps0), ("tps1", &s.tps1), ("bps0", &s.bps0), ("bps1", &s.bps1)]
        .into_iter()
        .filter(|(_, c)| c.calibration.is_none())
        .map(|(n, _)| n)
        .collect();
    tracing::info!(period_ms, used, budget, "self-check ok");
    if json {
        println!(
            "{}",
            json!({
                "status": "ok",
                "period_ms": period_ms,
                "rate_hz": rate_hz,
                "fifo_objects": used,
                "fifo_budget": budget,
                "runtime_calibration": runtime_calibration,
            })
        );
    } else {
        println!("Self-check OK: {period_ms} ms cycle ({rate_hz} Hz), CAN FIFO objects {used}/{budget}");
        if !runtime_calibration.is_empty() {
            println!("Needs runtime calibration: {}", runtime_calibration.join(", "));
        }
    }
    Ok(())
}

fn health(path: &Path) -> eyre::Result<()> {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let v = match load_config(path) {
        Ok(cfg) => json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": ts,
            "config": path.display().to_string(),
            "fifo_objects": fifo_objects(&cfg),
            "fifo_budget": cfg.can.message_object_budget,
        }),
        Err(e) => json!({
            "status": "error",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": ts,
            "config": path.display().to_string(),
            "error": format!("{e:#}"),
        }),
    };
    println!("{v}");
    if v["status"] == "ok" {
        Ok(())
    } else {
        std::process::exit(1)
    }
}

fn report_run(o: &RunOutcome, json: bool) {
    let s = &o.summary;
    let faults: Vec<&str> = s.faults_seen.iter_names().map(|(n, _)| n).collect();
    let counters = |c: &vcu_core::ChannelCounters| {
        json!({
            "sent": c.frames_sent,
            "received": c.frames_received,
            "busy": c.busy,
            "fifo_full": c.fifo_full,
            "stale": c.stale,
            "bus_off": c.bus_off,
            "other": c.other,
            "mirror_failures": c.mirror_failures,
            "recovery_polls": c.recovery_polls,
        })
    };
    if json {
        println!(
            "{}",
            json!({
                "cycles": s.cycles,
                "final_stage": s.final_stage.as_str(),
                "faults_seen": faults,
                "control_frames_sent": s.control_frames_sent,
                "last_torque_dnm": o.last_torque_dnm,
                "rtds_starts": o.rtds_starts,
                "calibrated_at_runtime": o.calibrated_at_runtime,
                "inverter_timeouts": o.inverter_timeouts,
                "output_failures": s.output_failures,
                "stopped_by_signal": s.stopped_by_signal,
                "cycle_us": {
                    "min": s.stats.min_us,
                    "avg": s.stats.avg_us(),
                    "max": s.stats.max_us,
                    "overruns": s.stats.overruns,
                    "worst_lateness": s.stats.worst_lateness_us,
                },
                "can": {
                    "high": counters(&s.counters.high),
                    "low": counters(&s.counters.low),
                },
            })
        );
        return;
    }
    println!("Run finished: {} cycles, final stage {}", s.cycles, s.final_stage);
    println!(
        "  control frames sent: {}, last torque {:.1} Nm",
        s.control_frames_sent,
        f32::from(o.last_torque_dnm) / 10.0
    );
    println!(
        "  CAN failures high/low: {}/{}, recovery polls {}",
        s.counters.high.failures(),
        s.counters.low.failures(),
        s.counters.high.recovery_polls + s.counters.low.recovery_polls
    );
    println!(
        "  cycle time min/avg/max (us): {} / {} / {}, overruns {}",
        s.stats.min_us,
        s.stats.avg_us(),
        s.stats.max_us,
        s.stats.overruns
    );
    if faults.is_empty() {
        println!("  faults seen: none");
    } else {
        println!("  faults seen: {}", faults.join(", "));
    }
}
