pub mod index;
pub mod normalize;
pub mod query;
pub mod worker;

pub use index::SearchIndex;
pub use normalize::{Normalizer, TermVector, WeightScheme};
pub use query::{rank, related, search, ScoredCard, MAX_RESULTS};
pub use worker::IndexWorker;
