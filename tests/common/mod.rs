#![allow(dead_code)]

use keygate::{InMemoryBucketRegistry, Limits, ManualClock};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Registry on a manual clock, so tests control elapsed time.
pub fn manual_registry() -> (Arc<InMemoryBucketRegistry>, ManualClock) {
    let clock = ManualClock::new();
    (Arc::new(InMemoryBucketRegistry::with_clock(Arc::new(clock.clone()))), clock)
}

pub fn per_minute(n: f64, burst: f64) -> Limits {
    Limits::per_minute(n, burst).expect("valid limits")
}

/// Captures formatted log output for assertions.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogGuard;
    fn make_writer(&'a self) -> Self::Writer {
        LogGuard(self.0.clone())
    }
}

pub struct LogGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Install a debug-level subscriber writing into a fresh capture for the
/// current thread.
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_max_level(tracing::Level::TRACE)
        .with_target(true)
        .with_ansi(false)
        .without_time()
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
