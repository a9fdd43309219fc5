//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Hugging Face model loaded when none is configured.
///
/// This is the base Portuguese BERT checkpoint. It has no trained
/// `classifier.weight`, so with the default the service starts with the
/// classifier unavailable (`/health` reports `model_ready: false`) until
/// `MAIL_SORTER_MODEL` points at a fine-tuned sequence-classification
/// checkpoint.
pub const DEFAULT_MODEL: &str = "neuralmind/bert-base-portuguese-cased";

/// Label set of the reference deployment, in model output order.
pub const DEFAULT_LABELS: &[&str] = &["Improdutivo", "Produtivo"];

/// Service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP port.
    pub port: u16,
    /// Locale for stopwords and lemmatization (e.g. "pt", "pt-BR").
    pub locale: String,
    /// Hugging Face model id or a local directory holding
    /// `config.json`, `tokenizer.json` and `model.safetensors`.
    pub model: String,
    /// Ordered label set. `None` means "use the model's `id2label`".
    pub labels: Option<Vec<String>>,
    /// Optional TSV lemma table replacing the built-in one.
    pub lemma_table: Option<PathBuf>,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
    /// Optional deadline for a single inference call.
    pub inference_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            locale: "pt".to_string(),
            model: DEFAULT_MODEL.to_string(),
            labels: None,
            lemma_table: None,
            max_upload_bytes: 16 * 1024 * 1024, // 16 MiB
            inference_timeout: None,
        }
    }
}

impl AppConfig {
    /// Read configuration from `MAIL_SORTER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match var("MAIL_SORTER_PORT") {
            Some(raw) => parse(&raw, "MAIL_SORTER_PORT")?,
            None => defaults.port,
        };

        let max_upload_bytes = match var("MAIL_SORTER_MAX_UPLOAD_BYTES") {
            Some(raw) => parse(&raw, "MAIL_SORTER_MAX_UPLOAD_BYTES")?,
            None => defaults.max_upload_bytes,
        };

        let inference_timeout = match var("MAIL_SORTER_INFERENCE_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = parse(&raw, "MAIL_SORTER_INFERENCE_TIMEOUT_SECS")?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "MAIL_SORTER_INFERENCE_TIMEOUT_SECS".into(),
                        message: "must be greater than zero".into(),
                    });
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        let labels = var("MAIL_SORTER_LABELS")
            .map(|raw| {
                let labels: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                crate::classifier::LabelSet::new(labels.clone()).map(|_| labels)
            })
            .transpose()?;

        Ok(Self {
            port,
            locale: var("MAIL_SORTER_LOCALE").unwrap_or(defaults.locale),
            model: var("MAIL_SORTER_MODEL").unwrap_or(defaults.model),
            labels,
            lemma_table: var("MAIL_SORTER_LEMMA_TABLE").map(PathBuf::from),
            max_upload_bytes,
            inference_timeout,
        })
    }
}

fn parse<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
