// Probe pipeline: payload strategies, candidate extraction,
// differential analysis, and location resolution.

pub mod differential;
pub mod extractor;
pub mod location;
pub mod strategies;

pub use differential::{DifferentialConfig, DifferentialEngine, ParameterCandidate};
pub use extractor::{CandidateExtractor, RegexCandidateExtractor};
pub use location::{LocationResolver, LocationResult, LocationTest};
pub use strategies::{all_strategies, default_strategies, PayloadConfig, ProbeStrategy};
