#![no_main]

use libfuzzer_sys::fuzz_target;
use reco_core::config::Config;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // A config that validates must always yield a working naming scheme.
    if let Ok(config) = Config::from_toml(text) {
        let scheme = config.naming_scheme().expect("validated scheme");
        let name = scheme.generate(1, 1).expect("validated grammar");
        assert!(scheme.is_generated_name(&name.to_string()));
    }
});
