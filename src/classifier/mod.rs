//! Sequence classification of raw correspondence text.
//!
//! `Classifier` owns an optional model handle and a fixed label set. It is
//! total: every call returns a `ClassificationResult`, and every failure
//! (model never loaded, tokenizer fault, forward-pass fault, panic inside the
//! runtime) becomes a result with the `"Error"` category.

pub mod bert;

pub use bert::BertSequenceModel;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, DEFAULT_LABELS};
use crate::error::{ConfigError, InferenceError, ModelError};

/// Category reported for every failed classification.
pub const ERROR_CATEGORY: &str = "Error";

/// Maximum number of subword units fed to the model.
pub const MAX_SEQUENCE_LENGTH: usize = 512;

// ── Model seam ──────────────────────────────────────────────────────

/// A pretrained sequence-classification model plus its tokenizer.
///
/// Implementations must truncate input to `MAX_SEQUENCE_LENGTH` units and
/// return one raw score per label, in label order. The handle is shared
/// read-only across concurrent calls.
pub trait SequenceModel: Send + Sync {
    /// Model identifier for logging.
    fn name(&self) -> &str;

    /// Raw output scores for `text`.
    fn logits(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}

// ── Labels ──────────────────────────────────────────────────────────

/// Ordered, non-empty set of distinct category names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    /// Validate a label list. Labels must be non-empty, distinct and must
    /// not collide with the error sentinel.
    pub fn new(labels: Vec<String>) -> Result<Self, ConfigError> {
        if labels.is_empty() {
            return Err(ConfigError::InvalidLabels("label set is empty".into()));
        }
        for (i, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(ConfigError::InvalidLabels(format!("label {i} is blank")));
            }
            if label == ERROR_CATEGORY {
                return Err(ConfigError::InvalidLabels(format!(
                    "{ERROR_CATEGORY:?} is reserved"
                )));
            }
            if labels[..i].contains(label) {
                return Err(ConfigError::InvalidLabels(format!(
                    "duplicate label {label:?}"
                )));
            }
        }
        Ok(Self(labels))
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Label at output index `idx`.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }

    /// Labels in model output order.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self(DEFAULT_LABELS.iter().map(|s| s.to_string()).collect())
    }
}

// ── Result ──────────────────────────────────────────────────────────

/// Outcome of one classification.
///
/// Fields are private so the invariant holds by construction:
/// `error.is_some()` ⟺ `category == "Error"` ⟺ `confidence == 0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    category: String,
    /// Percentage in `[0, 100]`, two decimals.
    confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ClassificationResult {
    fn success(category: &str, probability: f64) -> Self {
        let percent = (probability * 100.0).clamp(0.0, 100.0);
        Self {
            category: category.to_string(),
            confidence: (percent * 100.0).round() / 100.0,
            error: None,
        }
    }

    /// Failed classification carrying a diagnostic message.
    pub fn failure(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = "classification failed".to_string();
        }
        Self {
            category: ERROR_CATEGORY.to_string(),
            confidence: 0.0,
            error: Some(message),
        }
    }

    /// Winning label, or `"Error"`.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Confidence percentage in `[0, 100]`; `0.0` on failure.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Diagnostic message for failed classifications.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether this is a failed classification.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ── Classifier ──────────────────────────────────────────────────────

/// Load state of the model handle.
enum ModelState {
    Ready(Arc<dyn SequenceModel>),
    Unavailable { reason: String },
}

/// Total classifier over a shared, read-only model handle.
pub struct Classifier {
    state: ModelState,
    labels: LabelSet,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            ModelState::Ready(model) => format!("ready({})", model.name()),
            ModelState::Unavailable { reason } => format!("unavailable({reason})"),
        };
        f.debug_struct("Classifier")
            .field("state", &state)
            .field("labels", &self.labels)
            .finish()
    }
}

impl Classifier {
    /// Classifier over a loaded model.
    pub fn new(model: Arc<dyn SequenceModel>, labels: LabelSet) -> Self {
        Self {
            state: ModelState::Ready(model),
            labels,
        }
    }

    /// Classifier whose model failed to load. Every call short-circuits.
    pub fn unavailable(reason: impl Into<String>, labels: LabelSet) -> Self {
        let reason: String = reason.into();
        Self {
            state: ModelState::Unavailable {
                reason: first_line(&reason).to_string(),
            },
            labels,
        }
    }

    /// Load the configured model, failing closed.
    ///
    /// Blocking: fetches files and maps weights. Call from a blocking context.
    pub fn load(config: &AppConfig) -> Self {
        let configured = match config.labels.clone().map(LabelSet::new).transpose() {
            Ok(labels) => labels,
            Err(e) => return Self::unavailable(e.to_string(), LabelSet::default()),
        };

        match BertSequenceModel::load(&config.model, configured.as_ref()) {
            Ok(model) => {
                let labels = configured.unwrap_or_else(|| model.labels().clone());
                info!(
                    model = %config.model,
                    labels = ?labels.as_slice(),
                    "Classification model loaded"
                );
                Self::new(Arc::new(model), labels)
            }
            Err(e) => {
                warn!(model = %config.model, error = %e, "Classification model unavailable");
                Self::unavailable(describe_load_failure(&config.model, &e), configured.unwrap_or_default())
            }
        }
    }

    /// Whether a model is loaded.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ModelState::Ready(_))
    }

    /// Name of the loaded model, if any.
    pub fn model_name(&self) -> Option<&str> {
        match &self.state {
            ModelState::Ready(model) => Some(model.name()),
            ModelState::Unavailable { .. } => None,
        }
    }

    /// Configured labels.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Classify raw text. Never fails; see `ClassificationResult`.
    pub fn classify(&self, text: &str) -> ClassificationResult {
        let model = match &self.state {
            ModelState::Ready(model) => model,
            ModelState::Unavailable { reason } => {
                return ClassificationResult::failure(format!(
                    "classification model unavailable: {reason}"
                ));
            }
        };

        match self.try_classify(model.as_ref(), text) {
            Ok(result) => {
                debug!(
                    category = result.category(),
                    confidence = result.confidence(),
                    "Classified text"
                );
                result
            }
            Err(e) => {
                warn!(model = model.name(), error = %e, "Inference failed");
                ClassificationResult::failure(first_line(&e.to_string()))
            }
        }
    }

    fn try_classify(
        &self,
        model: &dyn SequenceModel,
        text: &str,
    ) -> Result<ClassificationResult, InferenceError> {
        let logits = panic::catch_unwind(AssertUnwindSafe(|| model.logits(text)))
            .map_err(|payload| InferenceError::Panicked(panic_message(payload.as_ref())))??;

        if logits.len() != self.labels.len() {
            return Err(InferenceError::ScoreCount {
                got: logits.len(),
                expected: self.labels.len(),
            });
        }

        let probabilities = softmax(&logits)?;
        let (best, probability) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

        let label = self.labels.get(best).ok_or(InferenceError::ScoreCount {
            got: logits.len(),
            expected: self.labels.len(),
        })?;
        Ok(ClassificationResult::success(label, probability))
    }
}

/// Numerically stable softmax in `f64`.
pub fn softmax(logits: &[f32]) -> Result<Vec<f64>, InferenceError> {
    if logits.iter().any(|x| !x.is_finite()) {
        return Err(InferenceError::NonFinite);
    }
    let max = logits
        .iter()
        .map(|&x| f64::from(x))
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&x| (f64::from(x) - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / sum).collect())
}

fn describe_load_failure(model: &str, e: &ModelError) -> String {
    format!("failed to load {model}: {e}")
}

/// Runtime errors may carry a backtrace after the first line; clients only
/// get the first line.
fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default().trim_end()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
