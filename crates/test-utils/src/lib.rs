pub mod builders;
pub mod fake_process_engine;

use std::sync::{Arc, Once};

use caseflow::config::EngineConfig;
use caseflow::engine::CaseService;
use tracing_subscriber::{fmt, EnvFilter};

pub use fake_process_engine::FakeProcessEngine;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A service with default configuration backed by a fake process engine
/// that knows `process_definitions`.
pub fn service_with_fake_engine(process_definitions: &[&str]) -> (CaseService, FakeProcessEngine) {
    let engine = FakeProcessEngine::new(process_definitions.iter().copied());
    let service = CaseService::new(&EngineConfig::default(), Arc::new(engine.clone()));
    (service, engine)
}
