//! Assembly-quoting engine for DNA synthesis: decomposes target sequences
//! into orderable fragments over a graph of suppliers, assembly stations
//! and comparators, and returns priced quote trees.

use enzymes::Enzymes;
use lazy_static::lazy_static;

pub mod cache;
pub mod comparator;
pub mod constraints;
pub mod decomposer;
pub mod enzymes;
pub mod error;
pub mod methods;
pub mod quote;
pub mod sequence;
pub mod source;
pub mod station;

lazy_static! {
    // Restriction enzyme catalog
    pub static ref ENZYMES: Enzymes = Enzymes::default();
}

pub use comparator::SourceComparator;
pub use constraints::{CutConstraint, CutsSetConstraint, PricingModel, SequenceConstraint};
pub use decomposer::{
    AStarFactor, DecomposerSettings, Decomposition, SegmentDecomposer, SegmentOracle, SegmentScore,
};
pub use error::{ErrorCode, NoSolutionFound, QuoteError};
pub use methods::{AssemblyMethod, BluntAssembly, GibsonAssembly, GoldenGateAssembly};
pub use quote::{PlanEntry, Quote, QuoteReport};
pub use sequence::{DnaSequence, Segment};
pub use source::{CutSuggester, DnaSynthesisOffer, QuoteRequest, QuoteSource};
pub use station::{AssemblyStation, StationSettings};
