use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use armory_store::{CacheStore, MemoryStore, StoreError};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::time::sleep;

use super::*;

const BASE: u64 = 10_000 * DAY_MS + 17 * 3_600_000 + 1_000;

fn registry_at(ms: u64) -> (ModelRegistry, Arc<ManualClock>, Arc<MemoryStore>) {
	let clock = Arc::new(ManualClock::new(ms));
	let store = Arc::new(MemoryStore::new());
	let registry = ModelRegistry::with_clock(clock.clone(), ResetSchedule::default(), store.clone());
	(registry, clock, store)
}

/// Counting generator returning how many times it has run.
fn counting(counter: &Arc<AtomicUsize>) -> impl Fn(ProgressReporter) -> futures::future::BoxFuture<'static, anyhow::Result<usize>> + Send + Sync + 'static {
	let counter = Arc::clone(counter);
	move |_reporter| {
		let counter = Arc::clone(&counter);
		Box::pin(async move { anyhow::Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) })
	}
}

#[tokio::test]
async fn single_flight_coalesces_concurrent_gets() {
	let (registry, _clock, _store) = registry_at(BASE);
	let counter = Arc::new(AtomicUsize::new(0));
	let model = registry.session_model("profile", ResetPolicy::Global, {
		let counter = Arc::clone(&counter);
		move |_reporter| {
			let counter = Arc::clone(&counter);
			async move {
				sleep(Duration::from_millis(5)).await;
				counter.fetch_add(1, Ordering::SeqCst);
				anyhow::Ok(42u32)
			}
		}
	});

	let results = join_all((0..5).map(|_| model.get())).await;
	assert_eq!(counter.load(Ordering::SeqCst), 1);

	let first = results[0].as_ref().unwrap().clone().unwrap();
	for result in &results {
		let value = result.as_ref().unwrap().as_ref().unwrap().clone();
		// Identical value reference, not merely an equal value.
		assert!(Arc::ptr_eq(&first, &value));
	}
}

#[tokio::test]
async fn daily_model_regenerates_only_across_the_boundary() {
	let (registry, clock, _store) = registry_at(BASE);
	let counter = Arc::new(AtomicUsize::new(0));
	let model = registry.session_model("daily stats", ResetPolicy::Daily, counting(&counter));

	assert_eq!(*model.get().await.unwrap().unwrap(), 1);
	// Second read within the same day: no new generation.
	clock.advance(DAY_MS / 2);
	assert_eq!(*model.get().await.unwrap().unwrap(), 1);
	assert_eq!(counter.load(Ordering::SeqCst), 1);

	// Crossing the daily boundary forces exactly one new generation.
	clock.advance(DAY_MS);
	assert_eq!(*model.get().await.unwrap().unwrap(), 2);
	assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn clear_always_forces_regeneration() {
	let (registry, _clock, _store) = registry_at(BASE);
	let counter = Arc::new(AtomicUsize::new(0));
	let model = registry.session_model("settings", ResetPolicy::Global, counting(&counter));

	model.get().await.unwrap();
	model.clear().await;
	model.get().await.unwrap();
	assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn global_tier_round_trips_through_the_store() {
	let (registry, clock, store) = registry_at(BASE);
	let counter = Arc::new(AtomicUsize::new(0));
	let model = registry.global_model("settings", ResetPolicy::Daily, counting(&counter));
	assert_eq!(*model.get().await.unwrap().unwrap(), 1);
	assert_eq!(store.len(), 1);

	// Simulated reload: a fresh registry over the same store and clock.
	let reloaded = ModelRegistry::with_clock(clock.clone(), ResetSchedule::default(), store.clone());
	let second_counter = Arc::new(AtomicUsize::new(0));
	let model = reloaded.global_model("settings", ResetPolicy::Daily, counting(&second_counter));

	assert_eq!(*model.get().await.unwrap().unwrap(), 1);
	assert_eq!(second_counter.load(Ordering::SeqCst), 0, "seeded value must not regenerate");
}

#[tokio::test]
async fn stale_persisted_value_regenerates_on_reload() {
	let (registry, clock, store) = registry_at(BASE);
	let counter = Arc::new(AtomicUsize::new(0));
	let model = registry.global_model("daily vendor", ResetPolicy::Daily, counting(&counter));
	model.get().await.unwrap();

	clock.advance(2 * DAY_MS);
	let reloaded = ModelRegistry::with_clock(clock.clone(), ResetSchedule::default(), store.clone());
	let second_counter = Arc::new(AtomicUsize::new(0));
	let model = reloaded.global_model("daily vendor", ResetPolicy::Daily, counting(&second_counter));

	assert_eq!(*model.get().await.unwrap().unwrap(), 1);
	assert_eq!(second_counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failure_rejects_waiters_and_stays_retryable() {
	let (registry, clock, _store) = registry_at(BASE);
	let failing = Arc::new(AtomicBool::new(false));
	let counter = Arc::new(AtomicUsize::new(0));
	let model = registry.session_model("pgcr", ResetPolicy::Daily, {
		let failing = Arc::clone(&failing);
		let counter = Arc::clone(&counter);
		move |_reporter| {
			let failing = Arc::clone(&failing);
			let counter = Arc::clone(&counter);
			async move {
				sleep(Duration::from_millis(2)).await;
				counter.fetch_add(1, Ordering::SeqCst);
				if failing.load(Ordering::SeqCst) {
					anyhow::bail!("remote API unavailable");
				}
				anyhow::Ok(7u32)
			}
		}
	});

	model.get().await.unwrap();
	clock.advance(2 * DAY_MS);
	failing.store(true, Ordering::SeqCst);

	// All coalesced waiters receive the same rejection from one attempt.
	let results = join_all((0..3).map(|_| model.get())).await;
	assert_eq!(counter.load(Ordering::SeqCst), 2);
	for result in results {
		assert!(matches!(result, Err(ModelError::Generate { .. })));
	}

	// The model is not poisoned: the next get retries unconditionally.
	failing.store(false, Ordering::SeqCst);
	assert_eq!(*model.get().await.unwrap().unwrap(), 7);
}

#[tokio::test]
async fn generator_panic_surfaces_and_stays_retryable() {
	let (registry, _clock, _store) = registry_at(BASE);
	let panicking = Arc::new(AtomicBool::new(true));
	let model = registry.session_model("flaky", ResetPolicy::Global, {
		let panicking = Arc::clone(&panicking);
		move |_reporter| {
			let panicking = Arc::clone(&panicking);
			async move {
				assert!(!panicking.load(Ordering::SeqCst), "injected panic");
				anyhow::Ok(1u32)
			}
		}
	});

	let err = model.get().await.unwrap_err();
	assert!(matches!(err, ModelError::Panicked { .. }));
	assert_eq!(err.id(), "flaky");

	panicking.store(false, Ordering::SeqCst);
	assert_eq!(*model.get().await.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn trials_model_returns_absent_while_inactive() {
	let active = Arc::new(AtomicBool::new(false));
	let clock = Arc::new(ManualClock::new(BASE));
	let store = Arc::new(MemoryStore::new());
	let schedule = ResetSchedule::default().with_trials_gate({
		let active = Arc::clone(&active);
		Arc::new(move || active.load(Ordering::Relaxed))
	});
	let registry = ModelRegistry::with_clock(clock, schedule, store);

	let counter = Arc::new(AtomicUsize::new(0));
	let model = registry.session_model("trials leaderboard", ResetPolicy::Trials, counting(&counter));

	// Inactive with nothing cached: absent, and no fetch happens.
	assert_eq!(model.get().await.unwrap(), None);
	assert_eq!(counter.load(Ordering::SeqCst), 0);

	active.store(true, Ordering::Relaxed);
	assert_eq!(*model.get().await.unwrap().unwrap(), 1);

	// Back to inactive: the cached value stands without refreshing.
	active.store(false, Ordering::Relaxed);
	assert_eq!(*model.get().await.unwrap().unwrap(), 1);
	assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn progress_composes_across_a_dependency() {
	let (registry, _clock, _store) = registry_at(BASE);
	let dep = registry.session_model("manifest", ResetPolicy::Global, |reporter: ProgressReporter| async move {
		reporter.emit(0.3, Some("downloading manifest"));
		sleep(Duration::from_millis(1)).await;
		reporter.emit(0.8, Some("indexing manifest"));
		anyhow::Ok(5u32)
	});

	let parent = registry.session_model("profile merge", ResetPolicy::Global, {
		let dep = dep.clone();
		move |reporter: ProgressReporter| {
			let dep = dep.clone();
			async move {
				let manifest = reporter.drive(&dep, 0.5).await?.expect("dependency resolves");
				reporter.emit(0.75, Some("merging"));
				anyhow::Ok(*manifest * 2)
			}
		}
	});

	let seen = Arc::new(Mutex::new(Vec::new()));
	let subscription = parent.subscribe({
		let seen = Arc::clone(&seen);
		move |fraction, _message| seen.lock().push(fraction)
	});

	assert_eq!(*parent.get().await.unwrap().unwrap(), 10);
	drop(subscription);

	let seen = seen.lock();
	assert!(!seen.is_empty());
	assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress must be non-decreasing: {seen:?}");
	// The dependency's updates arrive scaled into [0, 0.5].
	assert!(seen.contains(&0.15), "expected 0.3 * 0.5 forwarded: {seen:?}");
	assert!(seen.contains(&0.5), "dependency completion lands on its weight: {seen:?}");
	assert_eq!(*seen.last().unwrap(), 1.0);
	assert_eq!(parent.progress(), 1.0);
}

#[tokio::test]
async fn dependency_failure_propagates_to_the_dependent() {
	let (registry, _clock, _store) = registry_at(BASE);
	let failing = Arc::new(AtomicBool::new(true));
	let dep = registry.session_model("manifest", ResetPolicy::Global, {
		let failing = Arc::clone(&failing);
		move |_reporter| {
			let failing = Arc::clone(&failing);
			async move {
				if failing.load(Ordering::SeqCst) {
					anyhow::bail!("manifest download failed");
				}
				anyhow::Ok(5u32)
			}
		}
	});

	let parent = registry.session_model("profile merge", ResetPolicy::Global, {
		let dep = dep.clone();
		move |reporter: ProgressReporter| {
			let dep = dep.clone();
			async move {
				let manifest = reporter.drive(&dep, 1.0).await?.expect("dependency resolves");
				anyhow::Ok(*manifest * 2)
			}
		}
	});

	let err = parent.get().await.unwrap_err();
	assert_eq!(err.id(), "profile merge");

	failing.store(false, Ordering::SeqCst);
	assert_eq!(*parent.get().await.unwrap().unwrap(), 10);
}

/// Store whose writes always fail; reads behave as empty.
struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
	async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
		Ok(None)
	}

	async fn put(&self, key: &str, _value: Vec<u8>) -> Result<(), StoreError> {
		Err(StoreError::Io {
			key: key.to_owned(),
			source: std::io::Error::other("disk full"),
		})
	}

	async fn delete(&self, _key: &str) -> Result<(), StoreError> {
		Ok(())
	}

	async fn clear(&self) -> Result<(), StoreError> {
		Ok(())
	}
}

#[tokio::test]
async fn persistence_failure_is_degraded_not_fatal() {
	let clock = Arc::new(ManualClock::new(BASE));
	let registry = ModelRegistry::with_clock(clock, ResetSchedule::default(), Arc::new(BrokenStore));
	let counter = Arc::new(AtomicUsize::new(0));
	let model = registry.global_model("settings", ResetPolicy::Global, counting(&counter));

	// The put failure is logged and swallowed; the caller still gets a value.
	assert_eq!(*model.get().await.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn clear_all_sweeps_memory_and_store() {
	let (registry, _clock, store) = registry_at(BASE);
	let session_counter = Arc::new(AtomicUsize::new(0));
	let global_counter = Arc::new(AtomicUsize::new(0));
	let session = registry.session_model("characters", ResetPolicy::Global, counting(&session_counter));
	let global = registry.global_model("settings", ResetPolicy::Global, counting(&global_counter));

	session.get().await.unwrap();
	global.get().await.unwrap();
	assert_eq!(store.len(), 1);

	registry.clear_all().await;
	assert!(store.is_empty());

	session.get().await.unwrap();
	global.get().await.unwrap();
	assert_eq!(session_counter.load(Ordering::SeqCst), 2);
	assert_eq!(global_counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn await_all_pending_waits_for_inflight_resolutions() {
	let (registry, _clock, _store) = registry_at(BASE);
	let counter = Arc::new(AtomicUsize::new(0));
	let model = registry.session_model("manifest", ResetPolicy::Global, {
		let counter = Arc::clone(&counter);
		move |_reporter| {
			let counter = Arc::clone(&counter);
			async move {
				sleep(Duration::from_millis(10)).await;
				counter.fetch_add(1, Ordering::SeqCst);
				anyhow::Ok(9u32)
			}
		}
	});

	// Fire-and-forget startup load.
	let kicked = tokio::spawn({
		let model = model.clone();
		async move { model.get().await }
	});
	sleep(Duration::from_millis(1)).await;

	registry.await_all_pending().await;
	assert_eq!(counter.load(Ordering::SeqCst), 1);

	// The value is already installed; this read joins nothing.
	assert_eq!(*model.get().await.unwrap().unwrap(), 9);
	assert_eq!(counter.load(Ordering::SeqCst), 1);
	kicked.await.unwrap().unwrap();
}

#[tokio::test]
async fn get_or_create_returns_the_existing_model() {
	let (registry, _clock, _store) = registry_at(BASE);
	let first_counter = Arc::new(AtomicUsize::new(0));
	let second_counter = Arc::new(AtomicUsize::new(0));

	let first = registry.get_or_create_session("manifest [DamageType]", ResetPolicy::Global, counting(&first_counter));
	let second = registry.get_or_create_session("manifest [DamageType]", ResetPolicy::Global, counting(&second_counter));

	first.get().await.unwrap();
	second.get().await.unwrap();
	assert_eq!(first_counter.load(Ordering::SeqCst), 1);
	assert_eq!(second_counter.load(Ordering::SeqCst), 0, "second factory must never run");
}

#[tokio::test]
#[should_panic(expected = "duplicate model id")]
async fn duplicate_id_is_a_construction_bug() {
	let (registry, _clock, _store) = registry_at(BASE);
	let counter = Arc::new(AtomicUsize::new(0));
	let _first = registry.session_model("settings", ResetPolicy::Global, counting(&counter));
	let _second = registry.session_model("settings", ResetPolicy::Global, counting(&counter));
}

#[tokio::test]
async fn dropped_subscription_stops_receiving() {
	let (registry, _clock, _store) = registry_at(BASE);
	let model = registry.session_model("profile", ResetPolicy::Global, |reporter: ProgressReporter| async move {
		reporter.emit(0.5, None);
		anyhow::Ok(1u32)
	});

	let seen = Arc::new(Mutex::new(Vec::new()));
	let subscription = model.subscribe({
		let seen = Arc::clone(&seen);
		move |fraction, _| seen.lock().push(fraction)
	});
	drop(subscription);

	model.get().await.unwrap();
	assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn wait_ready_resolves_before_returning() {
	let (registry, _clock, _store) = registry_at(BASE);
	let counter = Arc::new(AtomicUsize::new(0));
	let model = registry.session_model("settings", ResetPolicy::Global, counting(&counter));

	assert_eq!(*model.wait_ready().await.unwrap().unwrap(), 1);
	assert_eq!(counter.load(Ordering::SeqCst), 1);
}
