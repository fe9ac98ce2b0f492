// Catalog module
// Value types for one catalog entry plus the merge and clean stages

pub mod cleaner;
pub mod merge;
pub mod models;

pub use cleaner::{DEFAULT_SOURCE, clean, extract_embedding_text};
pub use merge::merge;
pub use models::{
    CanonicalItem, CleanedRecord, DetailPartial, GameFields, MediaScore, MergedRecord,
    PriceFields, PriceQuote, RawPayloads, RelationBundle, ReviewRecord, ScoreFields,
    ScorePartial, SummaryPartial,
};
