use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Milliseconds per day.
pub const DAY_MS: u64 = 86_400_000;
/// Milliseconds per week.
pub const WEEK_MS: u64 = 7 * DAY_MS;

/// Injected "is the special event currently active" predicate.
pub type TrialsGate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Staleness rule governing when a cached value must be regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
	/// Never auto-invalidates; only an explicit clear does.
	Global,
	/// Valid while both timestamps fall within the same daily reset window.
	Daily,
	/// Valid while both timestamps fall within the same weekly reset window.
	Weekly,
	/// Valid only while the event gate reports active; while inactive there
	/// is nothing to refresh and whatever is cached (or absent) stands.
	Trials,
	/// Fixed TTL from the cached timestamp.
	Ttl(Duration),
}

/// Reset anchors for the daily/weekly windows plus the event gate.
///
/// The exact boundary times are product-specific server constants, so they
/// are carried as configuration rather than hardcoded beyond the defaults.
#[derive(Clone)]
pub struct ResetSchedule {
	/// Offset of the daily boundary within a day (ms past UTC midnight).
	pub daily_offset_ms: u64,
	/// Epoch-ms offset of the weekly boundary within a week.
	pub weekly_offset_ms: u64,
	trials_active: TrialsGate,
}

impl Default for ResetSchedule {
	fn default() -> Self {
		Self {
			// Daily reset at 17:00 UTC.
			daily_offset_ms: 17 * 3_600_000,
			// Weekly reset Tuesday 17:00 UTC (epoch day zero is a Thursday).
			weekly_offset_ms: 5 * DAY_MS + 17 * 3_600_000,
			trials_active: Arc::new(|| false),
		}
	}
}

impl fmt::Debug for ResetSchedule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResetSchedule")
			.field("daily_offset_ms", &self.daily_offset_ms)
			.field("weekly_offset_ms", &self.weekly_offset_ms)
			.field("trials_active", &(self.trials_active)())
			.finish()
	}
}

fn period_index(t: u64, offset: u64, period: u64) -> u64 {
	t.saturating_sub(offset) / period
}

impl ResetSchedule {
	/// Replaces the event gate.
	pub fn with_trials_gate(mut self, gate: TrialsGate) -> Self {
		self.trials_active = gate;
		self
	}

	/// Whether the event window is currently active.
	pub fn trials_active(&self) -> bool {
		(self.trials_active)()
	}

	/// Whether a value cached at `cached_at` is still valid at `now`.
	///
	/// An absent `cached_at` is always invalid and forces generation.
	pub fn is_valid(&self, policy: ResetPolicy, cached_at: Option<u64>, now: u64) -> bool {
		let Some(cached_at) = cached_at else {
			return false;
		};
		match policy {
			ResetPolicy::Global => true,
			ResetPolicy::Daily => {
				period_index(cached_at, self.daily_offset_ms, DAY_MS)
					== period_index(now, self.daily_offset_ms, DAY_MS)
			}
			ResetPolicy::Weekly => {
				period_index(cached_at, self.weekly_offset_ms, WEEK_MS)
					== period_index(now, self.weekly_offset_ms, WEEK_MS)
			}
			ResetPolicy::Trials => {
				if self.trials_active() {
					period_index(cached_at, self.weekly_offset_ms, WEEK_MS)
						== period_index(now, self.weekly_offset_ms, WEEK_MS)
				} else {
					true
				}
			}
			ResetPolicy::Ttl(ttl) => now.saturating_sub(cached_at) < ttl.as_millis() as u64,
		}
	}
}
