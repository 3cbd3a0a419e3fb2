use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use armory_store::CacheStore;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::clock::Clock;
use crate::error::ModelError;
use crate::policy::{ResetPolicy, ResetSchedule};
use crate::progress::{ProgressChannel, ProgressReporter, ProgressSubscription};

/// Whether a resolved value persists across restarts or lives only in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
	/// Memory-only; gone at process teardown.
	Session,
	/// Written through to the cache store; a restart can serve a still-valid
	/// value without regenerating.
	Global,
}

/// Shared construction context: clock, reset anchors, persisted store.
#[derive(Clone)]
pub struct ModelContext {
	/// Time source for validity checks and cache stamps.
	pub clock: Arc<dyn Clock>,
	/// Reset anchors and the event gate.
	pub schedule: ResetSchedule,
	/// Store backing global-tier models.
	pub store: Arc<dyn CacheStore>,
}

/// Boxed generator supplied per model.
pub type GenerateFn<T> = Arc<dyn Fn(ProgressReporter) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

type ResolveResult<T> = Result<Option<Arc<T>>, ModelError>;
type InflightFuture<T> = Shared<BoxFuture<'static, ResolveResult<T>>>;

#[derive(serde::Serialize)]
struct EnvelopeRef<'a, T> {
	cached_at: u64,
	value: &'a T,
}

#[derive(serde::Deserialize)]
struct Envelope<T> {
	cached_at: u64,
	value: T,
}

fn encode_envelope<T: Serialize>(value: &T, cached_at: u64) -> serde_json::Result<Vec<u8>> {
	serde_json::to_vec(&EnvelopeRef { cached_at, value })
}

fn decode_envelope<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<(u64, T)> {
	let envelope: Envelope<T> = serde_json::from_slice(bytes)?;
	Ok((envelope.cached_at, envelope.value))
}

struct PersistCodec<T> {
	encode: fn(&T, u64) -> serde_json::Result<Vec<u8>>,
	decode: fn(&[u8]) -> serde_json::Result<(u64, T)>,
}

struct CachedValue<T> {
	at: u64,
	value: Arc<T>,
}

struct ModelState<T> {
	cached: Option<CachedValue<T>>,
	// At most one non-settled resolution exists per model at any instant.
	inflight: Option<InflightFuture<T>>,
	seeded: bool,
	resolved_once: bool,
}

impl<T> Default for ModelState<T> {
	fn default() -> Self {
		Self {
			cached: None,
			inflight: None,
			seeded: false,
			resolved_once: false,
		}
	}
}

struct Resolved<T> {
	at: u64,
	value: Arc<T>,
	// Freshly generated (as opposed to reloaded from the store).
	fresh: bool,
}

pub(crate) struct ModelInner<T> {
	id: String,
	tier: Tier,
	policy: ResetPolicy,
	ctx: ModelContext,
	generate: GenerateFn<T>,
	persist: Option<PersistCodec<T>>,
	state: Mutex<ModelState<T>>,
	progress: Arc<ProgressChannel>,
}

/// A named, cached, asynchronously resolved unit of derived data.
///
/// Cheap-clone handle; all clones share cache, in-flight resolution, and
/// progress channel.
pub struct Model<T> {
	inner: Arc<ModelInner<T>>,
}

impl<T> Clone for Model<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T: Send + Sync + 'static> Model<T> {
	pub(crate) fn new_session(id: String, policy: ResetPolicy, ctx: ModelContext, generate: GenerateFn<T>) -> Self {
		Self::build(id, Tier::Session, policy, ctx, generate, None)
	}

	pub(crate) fn new_global(id: String, policy: ResetPolicy, ctx: ModelContext, generate: GenerateFn<T>) -> Self
	where
		T: Serialize + DeserializeOwned,
	{
		let codec = PersistCodec {
			encode: encode_envelope::<T>,
			decode: decode_envelope::<T>,
		};
		Self::build(id, Tier::Global, policy, ctx, generate, Some(codec))
	}

	fn build(
		id: String,
		tier: Tier,
		policy: ResetPolicy,
		ctx: ModelContext,
		generate: GenerateFn<T>,
		persist: Option<PersistCodec<T>>,
	) -> Self {
		Self {
			inner: Arc::new(ModelInner {
				id,
				tier,
				policy,
				ctx,
				generate,
				persist,
				state: Mutex::new(ModelState::default()),
				progress: Arc::new(ProgressChannel::default()),
			}),
		}
	}

	/// Cache key, unique within the registry.
	pub fn id(&self) -> &str {
		&self.inner.id
	}

	/// Persistence tier.
	pub fn tier(&self) -> Tier {
		self.inner.tier
	}

	/// Staleness policy.
	pub fn policy(&self) -> ResetPolicy {
		self.inner.policy
	}

	/// Returns the cached value when still valid, otherwise triggers (or
	/// joins) a resolution.
	///
	/// Single-flight: every caller arriving while a resolution is in flight
	/// awaits the same shared future and receives the identical value. A
	/// failed generation leaves any previously valid value in place, rejects
	/// only the waiters that joined it, and the next `get` retries.
	///
	/// `Ok(None)` is only possible for `Trials`-policy models while the
	/// event gate reports inactive.
	pub async fn get(&self) -> Result<Option<Arc<T>>, ModelError> {
		let inflight = {
			let mut state = self.inner.state.lock();
			let now = self.inner.ctx.clock.now_ms();
			let cached_at = state.cached.as_ref().map(|cached| cached.at);
			if self.inner.ctx.schedule.is_valid(self.inner.policy, cached_at, now) {
				return Ok(state.cached.as_ref().map(|cached| Arc::clone(&cached.value)));
			}
			if self.inner.policy == ResetPolicy::Trials && !self.inner.ctx.schedule.trials_active() {
				// Nothing cached and the event is off: absent, no fetch.
				return Ok(None);
			}
			if let Some(inflight) = state.inflight.clone() {
				inflight
			} else {
				self.spawn_resolution(&mut state)
			}
		};
		inflight.await
	}

	/// Resolves, guaranteeing at least one completed resolution before
	/// returning.
	///
	/// Every cached value in this process arrives through a completed
	/// resolution (store seed or generation), so this reduces to [`Model::get`];
	/// dependents use this name to state that reading a stale in-memory
	/// default is unacceptable.
	pub async fn wait_ready(&self) -> Result<Option<Arc<T>>, ModelError> {
		self.get().await
	}

	/// Drops the in-memory value and deletes the persisted entry.
	///
	/// An in-flight resolution is not cancelled; its waiters still receive
	/// its result, and the next `get` after it settles re-validates against
	/// the cleared state. A store delete failure is logged and swallowed.
	pub async fn clear(&self) {
		{
			let mut state = self.inner.state.lock();
			state.cached = None;
			// The persisted entry is going away; never re-seed from it.
			state.seeded = true;
		}
		if self.inner.persist.is_some()
			&& let Err(err) = self.inner.ctx.store.delete(&self.inner.id).await
		{
			tracing::warn!(model = %self.inner.id, error = %err, "failed to delete persisted cache entry");
		}
	}

	/// Current progress fraction in `[0, 1]`.
	pub fn progress(&self) -> f64 {
		self.inner.progress.snapshot().0
	}

	/// Current progress message, if the generator set one.
	pub fn progress_message(&self) -> Option<String> {
		self.inner.progress.snapshot().1
	}

	/// Subscribes to progress updates; the guard unsubscribes on drop.
	pub fn subscribe(&self, f: impl Fn(f64, Option<&str>) + Send + Sync + 'static) -> ProgressSubscription {
		self.inner.progress.subscribe(f)
	}

	/// Future settling when the current in-flight resolution (if any) does.
	pub(crate) fn pending_done(&self) -> Option<BoxFuture<'static, ()>> {
		let state = self.inner.state.lock();
		state.inflight.clone().map(|inflight| inflight.map(|_| ()).boxed())
	}

	/// Spawns the single resolution task and installs it as the in-flight
	/// future. Caller holds the state lock, which also orders the task's
	/// final cleanup after the install below.
	fn spawn_resolution(&self, state: &mut ModelState<T>) -> InflightFuture<T> {
		let needs_seed = self.inner.persist.is_some() && !state.seeded;
		state.seeded = true;

		let inner = Arc::clone(&self.inner);
		let reporter = ProgressReporter::new(Arc::clone(&self.inner.progress));
		// Spawned (not merely shared) so the resolution runs to completion
		// even if every waiter moves on.
		let handle = tokio::spawn(async move {
			inner.progress.reset();
			let outcome = AssertUnwindSafe(inner.resolve(reporter, needs_seed))
				.catch_unwind()
				.await;
			let result = {
				let mut state = inner.state.lock();
				let result = match &outcome {
					Ok(Ok(resolved)) => {
						state.cached = Some(CachedValue {
							at: resolved.at,
							value: Arc::clone(&resolved.value),
						});
						state.resolved_once = true;
						Ok(Some(Arc::clone(&resolved.value)))
					}
					Ok(Err(err)) => Err(err.clone()),
					Err(_panic) => Err(ModelError::Panicked { id: inner.id.clone() }),
				};
				state.inflight = None;
				result
			};
			if let Ok(Ok(resolved)) = &outcome
				&& resolved.fresh
			{
				inner.persist_value(&resolved.value, resolved.at).await;
			}
			result
		});

		let id = self.inner.id.clone();
		let shared = handle
			.map(move |join| match join {
				Ok(result) => result,
				Err(_) => Err(ModelError::Panicked { id }),
			})
			.boxed()
			.shared();
		state.inflight = Some(shared.clone());
		shared
	}
}

impl<T: Send + Sync + 'static> ModelInner<T> {
	async fn resolve(&self, reporter: ProgressReporter, needs_seed: bool) -> Result<Resolved<T>, ModelError> {
		if needs_seed && let Some(resolved) = self.try_seed().await {
			return Ok(resolved);
		}
		match (self.generate)(reporter).await {
			Ok(value) => {
				self.progress.emit(1.0, None);
				Ok(Resolved {
					at: self.ctx.clock.now_ms(),
					value: Arc::new(value),
					fresh: true,
				})
			}
			Err(error) => Err(ModelError::Generate {
				id: self.id.clone(),
				error: Arc::new(error),
			}),
		}
	}

	/// Opportunistic reload of a persisted value. Any failure is a cache
	/// miss that falls through to the generator.
	async fn try_seed(&self) -> Option<Resolved<T>> {
		let codec = self.persist.as_ref()?;
		let bytes = match self.ctx.store.get(&self.id).await {
			Ok(Some(bytes)) => bytes,
			Ok(None) => return None,
			Err(err) => {
				tracing::warn!(model = %self.id, error = %err, "cache store read failed; regenerating");
				return None;
			}
		};
		let (at, value) = match (codec.decode)(&bytes) {
			Ok(decoded) => decoded,
			Err(err) => {
				tracing::warn!(model = %self.id, error = %err, "persisted cache entry unreadable; regenerating");
				return None;
			}
		};
		if !self.ctx.schedule.is_valid(self.policy, Some(at), self.ctx.clock.now_ms()) {
			return None;
		}
		Some(Resolved {
			at,
			value: Arc::new(value),
			fresh: false,
		})
	}

	async fn persist_value(&self, value: &Arc<T>, at: u64) {
		let Some(codec) = self.persist.as_ref() else {
			return;
		};
		let bytes = match (codec.encode)(value.as_ref(), at) {
			Ok(bytes) => bytes,
			Err(err) => {
				tracing::warn!(model = %self.id, error = %err, "failed to encode cache entry");
				return;
			}
		};
		// Losing persistence is degraded-but-functional; never surfaced to
		// the waiters.
		if let Err(err) = self.ctx.store.put(&self.id, bytes).await {
			tracing::warn!(model = %self.id, error = %err, "failed to persist cache entry");
		}
	}
}
