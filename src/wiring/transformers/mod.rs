//! Single-purpose stages built on direct task schedulers.
//!
//! Every operator owns an unbounded scheduler named after it, with one input
//! wire called `data`, and runs on the thread that feeds it.

mod filter;
mod router;
mod splitter;
mod transformer;

pub use filter::WireFilter;
pub use router::{RoutableData, RouterAddress, WireRouter};
pub use splitter::{WireCollectionSplitter, WireListSplitter};
pub use transformer::WireTransformer;

/// Name of the input wire every operator exposes
pub const OPERATOR_INPUT: &str = "data";
