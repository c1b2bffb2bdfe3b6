// Test Helpers Module - Integration Testing Infrastructure
//
// Scripted evaluator, mock transports and an event recorder shared by the unit
// tests and the integration tests under tests/.

pub mod evaluator;
pub mod listener;
pub mod transports;

pub use evaluator::ScriptedEvaluator;
pub use listener::RecordingListener;
pub use transports::{LifecycleLog, MockConnectors, MockDestination, MockSource};

use crate::config::{EngineConfig, RetryDefaults};
use std::time::Duration;

/// Engine configuration with timeouts short enough for tests
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        environment: "test".to_string(),
        queue_buffer_size: 16,
        stop_timeout_ms: 2_000,
        retry: RetryDefaults {
            retry_interval_ms: 20,
            retry_count: 0,
        },
        ..Default::default()
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
