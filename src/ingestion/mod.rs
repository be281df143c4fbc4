pub mod filters;
pub mod normalizer;
pub mod pipeline;

pub use normalizer::{normalize_snapshot, NormalizedSnapshot};
pub use pipeline::{rank_markets, run, RunContext, RunOutput};
