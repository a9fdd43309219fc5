//! BERT sequence-classification backend on candle.
//!
//! Loads a `BertForSequenceClassification` checkpoint (`config.json`,
//! `tokenizer.json`, `model.safetensors`) from a local directory or the
//! Hugging Face hub, and scores text as `classifier(tanh(pooler(CLS)))`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::safetensors::MmapedSafetensors;
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{Linear, VarBuilder, linear};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::Api;
use serde::Deserialize;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use super::{LabelSet, MAX_SEQUENCE_LENGTH, SequenceModel};
use crate::error::{InferenceError, ModelError};

/// Output projection of a sequence-classification checkpoint. Base
/// checkpoints lack it and fail to load.
const CLASSIFIER_WEIGHT: &str = "classifier.weight";

/// The parts of `config.json` the classification head needs.
#[derive(Debug, Deserialize)]
struct HeadConfig {
    hidden_size: usize,
    #[serde(default)]
    id2label: HashMap<String, String>,
}

/// Paths of the three files making up a checkpoint.
#[derive(Debug)]
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    /// A local directory wins over a hub id of the same name.
    fn locate(model: &str) -> Result<Self, ModelError> {
        let dir = Path::new(model);
        if dir.is_dir() {
            debug!(dir = %dir.display(), "Loading model from local directory");
            return Ok(Self {
                config: dir.join("config.json"),
                tokenizer: dir.join("tokenizer.json"),
                weights: dir.join("model.safetensors"),
            });
        }

        info!(model, "Fetching model from Hugging Face hub");
        let api = Api::new().map_err(|e| ModelError::Fetch {
            model: model.to_string(),
            file: "<hub>".to_string(),
            reason: e.to_string(),
        })?;
        let repo = api.model(model.to_string());
        let get = |file: &str| {
            repo.get(file).map_err(|e| ModelError::Fetch {
                model: model.to_string(),
                file: file.to_string(),
                reason: e.to_string(),
            })
        };
        Ok(Self {
            config: get("config.json")?,
            tokenizer: get("tokenizer.json")?,
            weights: get("model.safetensors")?,
        })
    }
}

/// A loaded BERT classifier. Read-only after construction, so one handle
/// serves concurrent forward passes.
pub struct BertSequenceModel {
    name: String,
    tokenizer: Tokenizer,
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    labels: LabelSet,
    device: Device,
}

impl BertSequenceModel {
    /// Load a checkpoint. `labels` overrides the checkpoint's `id2label`.
    pub fn load(model: &str, labels: Option<&LabelSet>) -> Result<Self, ModelError> {
        let files = ModelFiles::locate(model)?;

        let raw_config = std::fs::read_to_string(&files.config)?;
        let bert_config: BertConfig =
            serde_json::from_str(&raw_config).map_err(|e| ModelError::Config(e.to_string()))?;
        let head: HeadConfig =
            serde_json::from_str(&raw_config).map_err(|e| ModelError::Config(e.to_string()))?;
        let labels = match labels {
            Some(labels) => labels.clone(),
            None => labels_from_config(&head.id2label)?,
        };

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?;
        tokenizer
            .with_padding(None)
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?;

        let device = Device::Cpu;
        let outputs = head_outputs(&files.weights, &device)?;
        if outputs != labels.len() {
            return Err(ModelError::LabelMismatch {
                outputs,
                labels: labels.len(),
            });
        }

        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device) }
            .map_err(|e| ModelError::Weights(e.to_string()))?;

        let weights = |e: candle_core::Error| ModelError::Weights(e.to_string());
        let bert = BertModel::load(vb.clone(), &bert_config).map_err(weights)?;
        let pooler = linear(head.hidden_size, head.hidden_size, vb.pp("bert.pooler.dense"))
            .map_err(weights)?;
        let classifier =
            linear(head.hidden_size, labels.len(), vb.pp("classifier")).map_err(weights)?;

        Ok(Self {
            name: model.to_string(),
            tokenizer,
            bert,
            pooler,
            classifier,
            labels,
            device,
        })
    }

    /// Labels in output order.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    fn forward(&self, ids: &[u32], type_ids: &[u32], mask: &[u32]) -> candle_core::Result<Vec<f32>> {
        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(type_ids, &self.device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(mask, &self.device)?.unsqueeze(0)?;

        // (1, seq, hidden)
        let hidden = self
            .bert
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        self.classifier.forward(&pooled)?.squeeze(0)?.to_vec1::<f32>()
    }
}

impl SequenceModel for BertSequenceModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn logits(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| InferenceError::Tokenization(e.to_string()))?;
        debug!(units = encoding.len(), "Encoded input");
        self.forward(
            encoding.get_ids(),
            encoding.get_type_ids(),
            encoding.get_attention_mask(),
        )
        .map_err(|e| InferenceError::Forward(e.to_string()))
    }
}

/// Row count of `classifier.weight`, i.e. the number of model outputs.
fn head_outputs(weights: &Path, device: &Device) -> Result<usize, ModelError> {
    // SAFETY: the weights file is not modified while mapped.
    let tensors = unsafe { MmapedSafetensors::new(weights) }
        .map_err(|e| ModelError::Weights(e.to_string()))?;
    tensors
        .load(CLASSIFIER_WEIGHT, device)
        .and_then(|w| w.dim(0))
        .map_err(|e| ModelError::Weights(format!("classifier head: {e}")))
}

/// Ordered labels from a checkpoint's `id2label`. Indices must be `0..n`.
fn labels_from_config(id2label: &HashMap<String, String>) -> Result<LabelSet, ModelError> {
    if id2label.is_empty() {
        return Ok(LabelSet::default());
    }
    let mut indexed = Vec::with_capacity(id2label.len());
    for (idx, label) in id2label {
        let idx: usize = idx
            .parse()
            .map_err(|_| ModelError::Config(format!("id2label key {idx:?} is not an index")))?;
        indexed.push((idx, label.clone()));
    }
    indexed.sort_by_key(|(idx, _)| *idx);
    if indexed.iter().enumerate().any(|(pos, (idx, _))| pos != *idx) {
        return Err(ModelError::Config("id2label indices are not contiguous".into()));
    }
    LabelSet::new(indexed.into_iter().map(|(_, label)| label).collect())
        .map_err(|e| ModelError::Config(e.to_string()))
}
