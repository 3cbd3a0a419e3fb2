use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond epoch clock, injected so tests can steer validity windows.
pub trait Clock: Send + Sync {
	/// Milliseconds since the Unix epoch.
	fn now_ms(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now_ms(&self) -> u64 {
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|elapsed| elapsed.as_millis() as u64)
			.unwrap_or_default()
	}
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
	ms: AtomicU64,
}

impl ManualClock {
	/// Creates a clock pinned at `ms`.
	pub fn new(ms: u64) -> Self {
		Self { ms: AtomicU64::new(ms) }
	}

	/// Pins the clock to `ms`.
	pub fn set(&self, ms: u64) {
		self.ms.store(ms, Ordering::Release);
	}

	/// Moves the clock forward by `by_ms`.
	pub fn advance(&self, by_ms: u64) {
		self.ms.fetch_add(by_ms, Ordering::AcqRel);
	}
}

impl Clock for ManualClock {
	fn now_ms(&self) -> u64 {
		self.ms.load(Ordering::Acquire)
	}
}
