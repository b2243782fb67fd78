#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are both fine; panics are not.
    if let Ok(cfg) = vcu_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        // A config that validates must also convert into runtime settings.
        let _ = vcu_core::VcuSettings::from(&cfg);
    }
});
