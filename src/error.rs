//! Error types for Mail Sorter.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid label set: {0}")]
    InvalidLabels(String),

    #[error("Failed to load resource {path}: {reason}")]
    Resource { path: String, reason: String },
}

/// Errors raised while loading the classification model at startup.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Failed to fetch {file} for model {model}: {reason}")]
    Fetch {
        model: String,
        file: String,
        reason: String,
    },

    #[error("Failed to load tokenizer: {0}")]
    Tokenizer(String),

    #[error("Invalid model config: {0}")]
    Config(String),

    #[error("Failed to load weights: {0}")]
    Weights(String),

    #[error("Model has {outputs} outputs but {labels} labels are configured")]
    LabelMismatch { outputs: usize, labels: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Faults during a single classification call.
///
/// Never escapes `Classifier::classify`; it is converted into the
/// error field of the classification result.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Forward pass failed: {0}")]
    Forward(String),

    #[error("Model returned {got} scores, expected {expected}")]
    ScoreCount { got: usize, expected: usize },

    #[error("Model returned a non-finite score")]
    NonFinite,

    #[error("Inference panicked: {0}")]
    Panicked(String),

    #[error("Inference timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Faults inside the normalizer. Swallowed by `Normalizer::normalize`.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Lemmatizer failed on {token:?}: {reason}")]
    Lemmatizer { token: String, reason: String },
}

/// Document extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File is not valid UTF-8 text: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("Failed to read PDF: {0}")]
    Pdf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
