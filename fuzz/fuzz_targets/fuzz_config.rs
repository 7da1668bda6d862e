//! Fuzz target for configuration loading
//!
//! Feeds arbitrary text as a TOML configuration and builds the plan.
//! Both steps may reject the input but must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use modbus_planner::Config;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = Config::from_toml_str(text) {
        let _ = config.build_plan();
        let _ = config.poll_options();
    }
});
