use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use armory_store::CacheStore;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::clock::{Clock, SystemClock};
use crate::model::{GenerateFn, Model, ModelContext};
use crate::policy::{ResetPolicy, ResetSchedule};
use crate::progress::ProgressReporter;

/// Type-erased per-model operations used by registry-wide sweeps.
#[async_trait]
trait ModelOps: Send + Sync {
	async fn clear(&self);
	fn pending_done(&self) -> Option<BoxFuture<'static, ()>>;
}

#[async_trait]
impl<T: Send + Sync + 'static> ModelOps for Model<T> {
	async fn clear(&self) {
		Model::clear(self).await;
	}

	fn pending_done(&self) -> Option<BoxFuture<'static, ()>> {
		Model::pending_done(self)
	}
}

struct RegistryEntry {
	handle: Box<dyn Any + Send + Sync>,
	ops: Arc<dyn ModelOps>,
}

impl RegistryEntry {
	fn new<T: Send + Sync + 'static>(model: Model<T>) -> Self {
		Self {
			handle: Box::new(model.clone()),
			ops: Arc::new(model),
		}
	}
}

fn boxed_generator<T, F, Fut>(generate: F) -> GenerateFn<T>
where
	F: Fn(ProgressReporter) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
	Arc::new(move |reporter| generate(reporter).boxed())
}

/// Process-wide table of constructed models.
///
/// An explicit context object rather than an implicit global: tests build
/// isolated registries with their own clock, schedule, and store. Model ids
/// must be unique by convention (`"manifest [<Table>]"` for manifest-backed
/// models, short descriptive ids like `"settings"` otherwise); registering
/// a duplicate is a construction bug and panics.
#[derive(Clone)]
pub struct ModelRegistry {
	inner: Arc<RegistryInner>,
}

struct RegistryInner {
	ctx: ModelContext,
	entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl ModelRegistry {
	/// Creates a registry over the wall clock.
	pub fn new(schedule: ResetSchedule, store: Arc<dyn CacheStore>) -> Self {
		Self::with_clock(Arc::new(SystemClock), schedule, store)
	}

	/// Creates a registry with an injected clock.
	pub fn with_clock(clock: Arc<dyn Clock>, schedule: ResetSchedule, store: Arc<dyn CacheStore>) -> Self {
		Self {
			inner: Arc::new(RegistryInner {
				ctx: ModelContext { clock, schedule, store },
				entries: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// Shared construction context.
	pub fn context(&self) -> &ModelContext {
		&self.inner.ctx
	}

	/// Registers a session-tier model. Panics on a duplicate id.
	pub fn session_model<T, F, Fut>(&self, id: impl Into<String>, policy: ResetPolicy, generate: F) -> Model<T>
	where
		T: Send + Sync + 'static,
		F: Fn(ProgressReporter) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		let model = Model::new_session(id.into(), policy, self.inner.ctx.clone(), boxed_generator(generate));
		self.insert(model.clone());
		model
	}

	/// Registers a global-tier model persisted through the cache store.
	/// Panics on a duplicate id.
	pub fn global_model<T, F, Fut>(&self, id: impl Into<String>, policy: ResetPolicy, generate: F) -> Model<T>
	where
		T: Serialize + DeserializeOwned + Send + Sync + 'static,
		F: Fn(ProgressReporter) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		let model = Model::new_global(id.into(), policy, self.inner.ctx.clone(), boxed_generator(generate));
		self.insert(model.clone());
		model
	}

	/// Returns the session-tier model registered under `id`, constructing
	/// and registering it on first use.
	///
	/// This is the lazy per-table factory (ids like `"manifest [DamageType]"`)
	/// that replaces the original's property-interception proxies.
	pub fn get_or_create_session<T, F, Fut>(&self, id: &str, policy: ResetPolicy, generate: F) -> Model<T>
	where
		T: Send + Sync + 'static,
		F: Fn(ProgressReporter) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		let mut entries = self.inner.entries.lock();
		if let Some(entry) = entries.get(id) {
			return downcast(id, entry);
		}
		let model = Model::new_session(id.to_owned(), policy, self.inner.ctx.clone(), boxed_generator(generate));
		entries.insert(id.to_owned(), RegistryEntry::new(model.clone()));
		model
	}

	/// Global-tier counterpart of [`ModelRegistry::get_or_create_session`].
	pub fn get_or_create_global<T, F, Fut>(&self, id: &str, policy: ResetPolicy, generate: F) -> Model<T>
	where
		T: Serialize + DeserializeOwned + Send + Sync + 'static,
		F: Fn(ProgressReporter) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		let mut entries = self.inner.entries.lock();
		if let Some(entry) = entries.get(id) {
			return downcast(id, entry);
		}
		let model = Model::new_global(id.to_owned(), policy, self.inner.ctx.clone(), boxed_generator(generate));
		entries.insert(id.to_owned(), RegistryEntry::new(model.clone()));
		model
	}

	/// Clears every registered model, resolving once all persisted
	/// deletions have completed.
	///
	/// This is the authentication-reset entry point: no stale per-user data
	/// survives into a new session.
	pub async fn clear_all(&self) {
		let ops: Vec<Arc<dyn ModelOps>> = self
			.inner
			.entries
			.lock()
			.values()
			.map(|entry| Arc::clone(&entry.ops))
			.collect();
		join_all(ops.iter().map(|ops| ops.clear())).await;
	}

	/// Awaits every resolution currently in flight.
	///
	/// Lets fire-and-forget startup models finish before first paint
	/// without hand-wiring each one.
	pub async fn await_all_pending(&self) {
		let pending: Vec<_> = self
			.inner
			.entries
			.lock()
			.values()
			.filter_map(|entry| entry.ops.pending_done())
			.collect();
		join_all(pending).await;
	}

	fn insert<T: Send + Sync + 'static>(&self, model: Model<T>) {
		let id = model.id().to_owned();
		let prior = self.inner.entries.lock().insert(id.clone(), RegistryEntry::new(model));
		assert!(prior.is_none(), "duplicate model id '{id}'");
	}
}

fn downcast<T: Send + Sync + 'static>(id: &str, entry: &RegistryEntry) -> Model<T> {
	entry
		.handle
		.downcast_ref::<Model<T>>()
		.unwrap_or_else(|| panic!("model id '{id}' already registered with a different type"))
		.clone()
}
