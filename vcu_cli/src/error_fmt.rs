//! Human-readable error descriptions and structured JSON error formatting.

use vcu_core::error::{BuildError, VcuError};

/// Exit code for a config that failed to load or validate.
pub const EXIT_CONFIG: i32 = 3;
/// Exit code for a core that could not be assembled.
pub const EXIT_BUILD: i32 = 4;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingInputs | BuildError::MissingOutputs => format!(
                "What happened: The control core was built without its IO driver ({be}).\nLikely causes: The IO driver failed to initialize or was not wired into the builder.\nHow to fix: Pass inputs and outputs via with_inputs(...) / with_outputs(...)."
            ),
            BuildError::MissingHighChannel | BuildError::MissingLowChannel => format!(
                "What happened: A CAN channel is missing ({be}).\nLikely causes: The CAN controller failed to initialize.\nHow to fix: Provide both channels via with_high_channel(...) and with_low_channel(...)."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `vcu self-check`."
            ),
        };
    }

    if let Some(ve) = err.downcast_ref::<VcuError>() {
        if let Some(fault) = ve.transport() {
            return format!(
                "What happened: CAN transport failure ({fault:?}).\nLikely causes: Bus not terminated, wrong bit rate, or no other node powered.\nHow to fix: Check wiring and [can] bit rates; re-run with --log-level=debug."
            );
        }
        return format!(
            "What happened: {ve}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from the config loader
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Point --config at a readable TOML file (see etc/vcu.toml). Original: {msg}"
        );
    }
    if lower.contains("parse config") {
        return format!(
            "What happened: The config file is not valid TOML for this schema.\nLikely causes: A typo, a missing [sensors] section, or a value of the wrong type.\nHow to fix: Compare against etc/vcu.toml. Original: {msg}"
        );
    }
    if lower.contains("message objects") || lower.contains("fifo") {
        return format!(
            "What happened: CAN FIFO depths do not fit the controller.\nLikely causes: read/write depths across both channels exceed can.message_object_budget.\nHow to fix: Shrink [can.high]/[can.low] fifo depths. Original: {msg}"
        );
    }
    if lower.contains("bitrate") {
        return format!(
            "What happened: Unsupported CAN bit rate.\nLikely causes: A typo in [can.high] or [can.low].\nHow to fix: Use 125, 250, 500 or 1000 kbit/s. Original: {msg}"
        );
    }
    if lower.contains("must be") || lower.contains("require") {
        return format!(
            "What happened: Invalid configuration.\nLikely causes: Missing or out-of-range values.\nHow to fix: Edit the TOML config and try again. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: config problems, build problems, anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return EXIT_BUILD;
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG;
    }
    1
}

/// Marker wrapped around config load/validation failures.
#[derive(Debug)]
pub struct ConfigError;

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("invalid configuration")
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = if err.downcast_ref::<BuildError>().is_some() {
        "Build"
    } else if err.downcast_ref::<ConfigError>().is_some() {
        "Config"
    } else {
        "Error"
    };
    json!({
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_errors_are_typed() {
        let err = eyre::Report::new(BuildError::InvalidConfig("max torque must be > 0"));
        assert!(humanize(&err).contains("max torque must be > 0"));
        assert_eq!(exit_code_for_error(&err), EXIT_BUILD);
    }

    #[test]
    fn config_context_maps_to_config_exit_code() {
        let err = eyre::eyre!("can.high.bitrate_kbps must be one of [125, 250, 500, 1000]")
            .wrap_err(ConfigError);
        assert_eq!(exit_code_for_error(&err), EXIT_CONFIG);
        assert!(humanize(&err).contains("Unsupported CAN bit rate"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Config");
    }
}
