//! tagsmith-placement: keeps a canonical logo's placement on the keychain
//! blank inside printable limits.
//!
//! The [`PlacementEngine`] is pure state plus validation. It never
//! renders and performs no I/O; renderers observe it through
//! [`PlacementEngine::subscribe`] and [`PlacementEngine::view`].

pub mod bounds;
pub mod engine;
pub mod error;
pub mod transform;
pub mod verdict;

pub use bounds::{AxisRange, OffsetRange, PrintBounds};
pub use engine::{
    FinalizedDesign, ObserverId, PlacementEngine, PlacementEvent, PlacementState, RenderView,
    VerdictOutcome,
};
pub use error::{Operation, PlacementError};
pub use transform::{Footprint, PlacementTransform};
pub use verdict::{ManufacturabilityVerdict, Price, PriceParseError};
