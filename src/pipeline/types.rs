//! Shared types for the correspondence pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::classifier::ClassificationResult;

/// Outcome of running one message through normalization and classification.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// Per-request id, echoed in logs.
    pub id: Uuid,
    /// The text as received.
    pub original: String,
    /// Normalized form (may be empty).
    pub normalized: String,
    pub classification: ClassificationResult,
    /// Canned reply for the winning label. `None` on failure.
    pub suggested_response: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl Analysis {
    /// Confidence as a probability in `[0, 1]`.
    pub fn probability(&self) -> f64 {
        self.classification.confidence() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_analysis_serializes_error() {
        let analysis = Analysis {
            id: Uuid::new_v4(),
            original: "oi".into(),
            normalized: String::new(),
            classification: ClassificationResult::failure("model offline"),
            suggested_response: None,
            processed_at: Utc::now(),
        };
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["classification"]["category"], "Error");
        assert_eq!(json["classification"]["error"], "model offline");
        assert!(json["suggested_response"].is_null());
        assert_eq!(analysis.probability(), 0.0);
    }
}
