//!
//! Riffle runs batches of data-pipeline flows in dependency order.
//!
//! A [`Flow`] is one unit of work that reads from some taps and writes to
//! others; taps are plain identifier strings, compared by equality. Hand a
//! set of flows to a [`CascadeBuilder`] and it works out which feeds which,
//! rejects structural mistakes (duplicate names, two writers of one tap,
//! cycles), and produces a [`Cascade`].
//!
//! Running the cascade executes every flow exactly once, as concurrently as
//! the dependencies and the configured cap allow. Flows whose sinks are
//! already up to date are skipped. One flow's failure stops the rest, and
//! [`Cascade::complete`] re-raises it with the flow named; listeners
//! ([`CascadeListener`]) observe the run from the outside.

mod error;
pub use error::CascadeError;

/// the unit-of-work contract flows implement
mod flow;
pub use flow::Flow;

/// policies deciding whether an up-to-date flow still runs
mod skip;
pub use skip::{AlwaysSkip, NeverSkip, SkipStaleSinks, SkipStrategy};

mod stats;
pub use stats::{CascadeState, FlowState};

mod listener;
pub use listener::{CascadeListener, ConsoleListener};

mod job;

/// where jobs actually execute
mod spawn;
pub use spawn::{JobFn, JobHandle, SpawnStrategy, ThreadPoolSpawner};

mod scheduler;

mod cascade;
pub use cascade::Cascade;

mod builder;
pub use builder::CascadeBuilder;

mod exit;

/// Structural errors raised while assembling a cascade.
pub use graph::Error as ConfigurationError;
