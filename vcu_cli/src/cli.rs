//! Command line for the `vcu` binary, plus process-wide output state.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Set once from `--json`; error reporting in `main` reads it.
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "vcu", version, about = "Vehicle control unit (simulated hardware)")]
pub struct Cli {
    /// Vehicle config (TOML)
    #[arg(long, value_name = "FILE", default_value = "etc/vcu.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins if set
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub cmd: Commands,
}

/// How much of the address space `--rt` pins in RAM.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Leave paging alone
    None,
    /// Pages mapped at startup
    Current,
    /// Startup pages and every later allocation
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        if cfg!(target_os = "linux") {
            RtLock::Current
        } else {
            RtLock::None
        }
    }
}

/// Scenario knobs for `run`.
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Stop after this many cycles (default: run until Ctrl-C)
    #[arg(long, value_name = "N")]
    pub cycles: Option<u64>,
    /// Throttle fraction the simulated driver holds once driving
    #[arg(long, value_name = "FRACTION", default_value_t = 0.3)]
    pub throttle: f32,
    /// When the simulated driver presses the ready button, ms after start
    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub ready_at_ms: u64,
    /// Open the high-voltage interlock at this time
    #[arg(long, value_name = "MS")]
    pub hvil_drop_at_ms: Option<u64>,
    /// Force the high-priority channel into bus-off at this time
    #[arg(long, value_name = "MS")]
    pub bus_off_at_ms: Option<u64>,
    /// Press the brake together with the throttle from this time on
    #[arg(long, value_name = "MS")]
    pub brake_at_ms: Option<u64>,
    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on Linux.\n\nAttempts SCHED_FIFO priority, pins to one CPU, and locks memory with mlockall. This reduces cycle jitter but may require CAP_SYS_NICE / CAP_IPC_LOCK or a raised 'ulimit -l'. Ignored on other platforms."
    )]
    pub rt: bool,
    /// SCHED_FIFO priority for --rt (clamped to the platform range)
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,
    /// Memory locking mode for --rt: none, current, or all
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,
    /// CPU index to pin to for --rt (default 0)
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the simulated car through the start-up handshake
    Run(RunArgs),
    /// Validate the config and FIFO budget, build the core once
    SelfCheck,
    /// Health probe for operational monitoring (always JSON)
    Health,
}
