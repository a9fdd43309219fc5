//! Correspondence processing pipeline.
//!
//! Every message flows through:
//! 1. `Normalizer::normalize()`: cleaned lemma stream for inspection
//! 2. `Classifier::classify()`: label + confidence over the raw text
//! 3. `ReplySuggester::suggest()`: canned reply for the winning label

pub mod processor;
pub mod replies;
pub mod types;

pub use processor::MessageProcessor;
pub use replies::ReplySuggester;
pub use types::Analysis;
