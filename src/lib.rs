//! Mail Sorter: correspondence normalization and classification.

pub mod classifier;
pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod routes;
