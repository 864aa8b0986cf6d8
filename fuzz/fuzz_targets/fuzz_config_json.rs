//! Fuzz target: `AdapterConfig::from_json`
//!
//! Arbitrary bytes are parsed as a configuration document.
//!
//! Invariants checked:
//! - No panics under any input
//! - Every accepted config has exactly one bootstrap profile and unique names
//! - Every accepted config builds a service that starts in OFF
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use btlifecycle::app::events::AppEvent;
use btlifecycle::app::ports::EventSink;
use btlifecycle::app::service::AdapterService;
use btlifecycle::config::AdapterConfig;
use btlifecycle::fsm::AdapterState;
use libfuzzer_sys::fuzz_target;

struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _: &AppEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let Ok(json) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(cfg) = AdapterConfig::from_json(json) else {
        return;
    };

    assert_eq!(cfg.profiles.iter().filter(|p| p.is_bootstrap()).count(), 1);
    for (i, p) in cfg.profiles.iter().enumerate() {
        assert!(cfg.profiles[i + 1..].iter().all(|q| q.name != p.name));
    }

    let mut svc = AdapterService::new(&cfg);
    svc.start(&mut NullSink);
    assert_eq!(svc.state(), AdapterState::Off);
});
