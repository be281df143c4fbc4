pub mod classifier;
pub mod cluster;
pub mod coverage;
pub mod holder_signals;
pub mod scorer;
pub mod selector;

pub use classifier::{
    build_profiles, classify, wallet_filter_reasons, WalletClass, WalletClassification, WalletFilterReason,
};
pub use coverage::{compute_coverage, holder_targets, CoverageStat};
pub use holder_signals::{holder_signals, HolderSignals};
pub use scorer::{score, score_market, ScoreBreakdown};
pub use selector::{select, Selection, SelectionLimits};
