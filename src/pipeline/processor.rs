//! Message processor: runs raw correspondence through normalization,
//! classification and reply suggestion.
//!
//! The classifier sees the *raw* text: the model's own tokenizer handles
//! case and punctuation, and the normalized form is reported alongside for
//! inspection only.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{ClassificationResult, Classifier};
use crate::error::InferenceError;
use crate::normalize::Normalizer;
use crate::pipeline::replies::ReplySuggester;
use crate::pipeline::types::Analysis;

/// The correspondence pipeline. Cheap to share behind an `Arc`.
pub struct MessageProcessor {
    normalizer: Arc<Normalizer>,
    classifier: Arc<Classifier>,
    replies: ReplySuggester,
    inference_timeout: Option<Duration>,
}

impl MessageProcessor {
    pub fn new(normalizer: Arc<Normalizer>, classifier: Arc<Classifier>) -> Self {
        Self {
            normalizer,
            classifier,
            replies: ReplySuggester::default(),
            inference_timeout: None,
        }
    }

    /// Replace the reply templates.
    pub fn with_replies(mut self, replies: ReplySuggester) -> Self {
        self.replies = replies;
        self
    }

    /// Bound each inference call. Expired calls yield a failed classification.
    pub fn with_inference_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inference_timeout = timeout;
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Synchronous analysis on the calling thread. Blocking.
    pub fn analyze(&self, raw: &str) -> Analysis {
        let normalized = self.normalizer.normalize(raw);
        let classification = self.classifier.classify(raw);
        self.finish(raw.to_string(), normalized, classification)
    }

    /// Normalize on the blocking pool.
    pub async fn normalize(&self, raw: &str) -> String {
        let normalizer = Arc::clone(&self.normalizer);
        let text = raw.to_string();
        tokio::task::spawn_blocking(move || normalizer.normalize(&text))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Normalization task failed");
                String::new()
            })
    }

    /// Analysis with normalization and inference moved to the blocking pool.
    pub async fn process(&self, raw: String) -> Analysis {
        let classifier = Arc::clone(&self.classifier);
        let text = raw.clone();
        let task = tokio::task::spawn_blocking(move || classifier.classify(&text));

        let normalized = self.normalize(&raw).await;

        let joined = match self.inference_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs_f64(), "Inference timed out");
                    let classification =
                        ClassificationResult::failure(InferenceError::Timeout(limit).to_string());
                    return self.finish(raw, normalized, classification);
                }
            },
            None => task.await,
        };

        let classification = joined.unwrap_or_else(|e| {
            warn!(error = %e, "Inference task failed");
            ClassificationResult::failure(InferenceError::Panicked(e.to_string()).to_string())
        });
        self.finish(raw, normalized, classification)
    }

    fn finish(
        &self,
        original: String,
        normalized: String,
        classification: ClassificationResult,
    ) -> Analysis {
        let suggested_response = self.replies.suggest(&classification);
        let analysis = Analysis {
            id: Uuid::new_v4(),
            original,
            normalized,
            classification,
            suggested_response,
            processed_at: Utc::now(),
        };

        debug!(id = %analysis.id, normalized_len = analysis.normalized.len(), "Normalized message");
        if analysis.classification.is_error() {
            info!(
                id = %analysis.id,
                error = analysis.classification.error().unwrap_or_default(),
                "Message processed: classification failed"
            );
        } else {
            info!(
                id = %analysis.id,
                category = analysis.classification.category(),
                confidence = analysis.classification.confidence(),
                "Message processed"
            );
        }
        analysis
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::classifier::tests::StubModel;
    use crate::classifier::{LabelSet, SequenceModel};
    use crate::error::NormalizeError;
    use crate::normalize::{DictionaryLemmatizer, Lemmatizer, StopwordFilter};

    /// Records every text it is asked to score.
    struct RecordingModel {
        seen: Mutex<Vec<String>>,
    }

    impl SequenceModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }
        fn logits(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok(vec![0.0, 2.0])
        }
    }

    /// Identity lemmatizer that records which thread called it.
    struct ThreadRecordingLemmatizer {
        threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl Lemmatizer for ThreadRecordingLemmatizer {
        fn name(&self) -> &str {
            "thread-recording"
        }
        fn lemmatize(&self, token: &str) -> Result<String, NormalizeError> {
            self.threads.lock().unwrap().push(std::thread::current().id());
            Ok(token.to_string())
        }
    }

    struct SlowModel;

    impl SequenceModel for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }
        fn logits(&self, _text: &str) -> Result<Vec<f32>, InferenceError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(vec![0.0, 1.0])
        }
    }

    fn normalizer() -> Arc<Normalizer> {
        Arc::new(Normalizer::new(
            StopwordFilter::from_list(&["olá", "em", "abraços"]),
            Arc::new(DictionaryLemmatizer::portuguese()),
        ))
    }

    fn processor_with(model: Arc<dyn SequenceModel>) -> MessageProcessor {
        let classifier = Classifier::new(model, LabelSet::default());
        MessageProcessor::new(normalizer(), Arc::new(classifier))
    }

    const EMAIL: &str = "Olá, Maria enviou a fatura 2024 em https://x.com. Abraços";

    #[test]
    fn classifier_receives_raw_text() {
        let model = Arc::new(RecordingModel {
            seen: Mutex::new(Vec::new()),
        });
        let processor = processor_with(model.clone());

        let analysis = processor.analyze(EMAIL);

        assert_eq!(model.seen.lock().unwrap().as_slice(), [EMAIL.to_string()]);
        assert_eq!(analysis.original, EMAIL);
        assert_eq!(analysis.normalized, "maria enviar fatura");
        assert_eq!(analysis.classification.category(), "Produtivo");
        assert_eq!(analysis.classification.confidence(), 88.08);
        assert!(analysis.suggested_response.is_some());
    }

    #[tokio::test]
    async fn process_matches_analyze() {
        let processor = processor_with(Arc::new(StubModel {
            logits: vec![2.0, 0.0],
        }));
        let analysis = processor.process(EMAIL.to_string()).await;
        assert_eq!(analysis.classification.category(), "Improdutivo");
        assert_eq!(analysis.classification.confidence(), 88.08);
        assert_eq!(analysis.normalized, "maria enviar fatura");
    }

    #[tokio::test]
    async fn normalization_runs_off_the_async_worker() {
        let lemmatizer = Arc::new(ThreadRecordingLemmatizer {
            threads: Mutex::new(Vec::new()),
        });
        let normalizer = Normalizer::new(StopwordFilter::empty(), lemmatizer.clone());
        let classifier = Classifier::new(
            Arc::new(StubModel {
                logits: vec![0.0, 1.0],
            }),
            LabelSet::default(),
        );
        let processor = MessageProcessor::new(Arc::new(normalizer), Arc::new(classifier));

        let analysis = processor.process("contrato assinado".to_string()).await;

        assert_eq!(analysis.normalized, "contrato assinado");
        let worker = std::thread::current().id();
        let threads = lemmatizer.threads.lock().unwrap();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|id| *id != worker));
    }

    #[tokio::test]
    async fn unavailable_model_still_normalizes() {
        let classifier = Classifier::unavailable("weights missing", LabelSet::default());
        let processor = MessageProcessor::new(normalizer(), Arc::new(classifier));

        let analysis = processor.process(EMAIL.to_string()).await;

        assert!(analysis.classification.is_error());
        assert_eq!(analysis.classification.category(), "Error");
        assert_eq!(analysis.normalized, "maria enviar fatura");
        assert!(analysis.suggested_response.is_none());
    }

    #[tokio::test]
    async fn timeout_yields_failed_classification() {
        let processor = processor_with(Arc::new(SlowModel))
            .with_inference_timeout(Some(Duration::from_millis(20)));

        let analysis = processor.process("Bom dia".to_string()).await;

        assert!(analysis.classification.is_error());
        assert!(analysis.classification.error().unwrap().contains("timed out"));
        assert!(analysis.suggested_response.is_none());
    }

    #[tokio::test]
    async fn empty_input_is_classified_not_rejected() {
        let processor = processor_with(Arc::new(StubModel {
            logits: vec![0.0, 0.0],
        }));
        let analysis = processor.process(String::new()).await;
        assert_eq!(analysis.normalized, "");
        assert_eq!(analysis.classification.category(), "Improdutivo");
        assert_eq!(analysis.classification.confidence(), 50.0);
    }
}
