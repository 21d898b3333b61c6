//! Logging installs a process-wide subscriber, so these tests live in their
//! own binary.

use brrtguard::logging::{LogConfig, LoggingState};

#[test]
fn test_init_once_installs_only_once() {
    let state = LoggingState::new();
    assert!(!state.is_initialized());

    let mut config = LogConfig::default_dev();
    config.async_logging = false;
    assert!(state.init_once(&config).unwrap());
    assert!(state.is_initialized());
    assert!(!state.init_once(&config).unwrap());

    // A second state cannot replace the global subscriber
    let other = LoggingState::new();
    assert!(other.init_once(&config).is_err());
    assert!(!other.is_initialized());

    tracing::info!(test = "logging", "still logging after repeated init");
}
