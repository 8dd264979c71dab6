//! Composable dataflow stages and the static graph that connects them.
//!
//! Stages are [`TaskScheduler`]s registered in a [`WiringModel`]. Data enters a
//! scheduler through typed [`InputWire`]s, the bound handler runs on the
//! caller's thread, and results leave through the scheduler's [`OutputWire`],
//! which is soldered to downstream input wires or consumer functions while the
//! graph is assembled.

pub mod input;
pub mod model;
pub mod output;
pub mod scheduler;
pub mod transformers;

pub use input::{InputWire, WireSink};
pub use model::WiringModel;
pub use output::{OutputWire, SolderType};
pub use scheduler::{TaskScheduler, TaskSchedulerBuilder};
pub use transformers::{
    RoutableData, RouterAddress, WireCollectionSplitter, WireFilter, WireListSplitter,
    WireRouter, WireTransformer,
};
