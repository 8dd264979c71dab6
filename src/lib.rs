//! The concurrency and dataflow backbone of a gossip consensus node.
//!
//! Two halves live here:
//!
//! - **Wiring**: direct, thread-safe processing stages composed into a static
//!   graph, with per-stage backpressure that individual edges may bypass by
//!   injecting. Operators cover transforming, filtering, splitting collections
//!   and routing tagged data.
//! - **Coordination**: a permit gate admitting gossip sync sessions, a role
//!   lock keeping inbound and outbound syncs with a peer apart, a single-slot
//!   handoff, a monotonic wait counter and a per-peer ledger of events still
//!   in the intake pipeline.
//!
//! Contract violations are returned as [`WiringError`]s at the call site.
//! Blocking waits take a [`Cancellation`] and report cancellation as
//! [`WiringError::Interrupted`].
//!
//! # Example
//!
//! ```
//! use gossip_backbone::wiring::WiringModel;
//!
//! let model = WiringModel::new();
//! let doubler = model.scheduler_builder("doubler")?.build::<u64>()?;
//! let input = doubler.build_input_wire::<u64>("numbers")?;
//! input.bind(|x| Some(x * 2))?;
//!
//! let small = doubler.output_wire().build_filter("small", |x| *x < 10)?;
//! small.solder_to_consumer("printer", |x| println!("{x}"))?;
//!
//! input.put(3)?;
//! # Ok::<(), gossip_backbone::WiringError>(())
//! ```

pub mod backpressure;
pub mod cancel;
pub mod config;
pub mod error;
pub mod intake;
pub mod metrics;
pub mod node_id;
pub mod sync;
pub mod wiring;

// Re-exports for convenience
pub use cancel::Cancellation;
pub use config::BackboneConfig;
pub use error::{Result, WiringError};
pub use intake::PeerBackpressureLedger;
pub use metrics::{MetricsSnapshot, SchedulerMetrics};
pub use node_id::NodeId;
pub use sync::{Handoff, MonotonicWaitCounter, RoleLock, SyncPermitGate, SyncRole};
pub use wiring::{InputWire, OutputWire, SolderType, TaskScheduler, WiringModel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
