//! Hybrid search: trigram candidate filter plus multi-signal scoring.

pub mod candidates;
pub mod engine;
pub mod query;
pub mod scorer;
pub mod trigram;

pub use engine::{FileSearchResult, ScoreDetails, SearchEngine, SearchOptions, SearchResponse};
pub use query::{QueryIntent, SearchQuery};
