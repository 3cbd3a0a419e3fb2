//! Named, cached, asynchronously resolved units of remote-backed data.
//!
//! Goals:
//! - single-flight per model (N concurrent `get`s, exactly one generation)
//! - declared staleness (daily/weekly/event/TTL reset policies)
//! - persisted global tier that survives a restart without refetching
//! - composable 0→1 progress across chains of dependent model loads
//! - one registry sweep to clear everything on an authentication reset

mod clock;
mod error;
mod model;
mod policy;
mod progress;
mod registry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ModelError;
pub use model::{Model, ModelContext, Tier};
pub use policy::{DAY_MS, ResetPolicy, ResetSchedule, TrialsGate, WEEK_MS};
pub use progress::{ProgressReporter, ProgressSubscription};
pub use registry::ModelRegistry;

#[cfg(test)]
mod tests;
