use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::ModelError;
use crate::model::Model;

type ProgressFn = Arc<dyn Fn(f64, Option<&str>) + Send + Sync>;

#[derive(Default)]
struct ProgressState {
	fraction: f64,
	message: Option<String>,
	subscribers: Vec<(u64, ProgressFn)>,
}

/// Observable load-progress channel attached to one model.
#[derive(Default)]
pub(crate) struct ProgressChannel {
	state: Mutex<ProgressState>,
	next_subscriber: AtomicU64,
}

impl ProgressChannel {
	pub fn snapshot(&self) -> (f64, Option<String>) {
		let state = self.state.lock();
		(state.fraction, state.message.clone())
	}

	/// Updates progress and notifies subscribers in emission order.
	///
	/// Callbacks run outside the lock, so a subscriber may call back into
	/// the owning model without deadlocking.
	pub fn emit(&self, fraction: f64, message: Option<&str>) {
		let fraction = fraction.clamp(0.0, 1.0);
		let subscribers: Vec<ProgressFn> = {
			let mut state = self.state.lock();
			state.fraction = fraction;
			state.message = message.map(str::to_owned);
			state.subscribers.iter().map(|(_, f)| Arc::clone(f)).collect()
		};
		for subscriber in subscribers {
			subscriber(fraction, message);
		}
	}

	/// Rewinds to zero at the start of a new resolution.
	pub fn reset(&self) {
		self.emit(0.0, None);
	}

	pub fn subscribe(self: &Arc<Self>, f: impl Fn(f64, Option<&str>) + Send + Sync + 'static) -> ProgressSubscription {
		let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
		self.state.lock().subscribers.push((id, Arc::new(f)));
		ProgressSubscription {
			id,
			channel: Arc::downgrade(self),
		}
	}

	fn unsubscribe(&self, id: u64) {
		self.state.lock().subscribers.retain(|(sid, _)| *sid != id);
	}
}

/// Guard keeping a progress subscription alive; dropping it unsubscribes.
#[must_use = "dropping the subscription immediately unsubscribes"]
pub struct ProgressSubscription {
	id: u64,
	channel: Weak<ProgressChannel>,
}

impl Drop for ProgressSubscription {
	fn drop(&mut self) {
		if let Some(channel) = self.channel.upgrade() {
			channel.unsubscribe(self.id);
		}
	}
}

/// Progress handle passed into a model's generator.
///
/// Fractions are absolute positions on the model's own 0→1 bar; a generator
/// that loads two dependencies and then does its own work emits only in the
/// tail slice left over after [`ProgressReporter::drive`] calls.
#[derive(Clone)]
pub struct ProgressReporter {
	channel: Arc<ProgressChannel>,
	consumed: Arc<Mutex<f64>>,
}

impl ProgressReporter {
	pub(crate) fn new(channel: Arc<ProgressChannel>) -> Self {
		Self {
			channel,
			consumed: Arc::new(Mutex::new(0.0)),
		}
	}

	/// Reports absolute progress in `[0, 1]` with an optional message.
	pub fn emit(&self, fraction: f64, message: Option<&str>) {
		self.channel.emit(fraction, message);
	}

	/// Awaits `dep.get()` while forwarding its progress, scaled by `weight`,
	/// into this model's own channel.
	///
	/// Earlier `drive` calls in the same resolution shift later ones: the
	/// dependency's 0→1 maps into `[offset, offset + weight]`, presenting a
	/// single continuous bar across chained loads. A dependency rejection
	/// propagates unchanged and leaves this model's cache untouched.
	pub async fn drive<U>(&self, dep: &Model<U>, weight: f64) -> Result<Option<Arc<U>>, ModelError>
	where
		U: Send + Sync + 'static,
	{
		let base = *self.consumed.lock();
		let channel = Arc::clone(&self.channel);
		let forward = dep.subscribe(move |fraction, message| {
			channel.emit(base + fraction * weight, message);
		});
		let value = dep.get().await;
		drop(forward);
		if value.is_ok() {
			*self.consumed.lock() = base + weight;
			self.channel.emit(base + weight, None);
		}
		value
	}
}
