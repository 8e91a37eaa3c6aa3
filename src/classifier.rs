use anyhow::{bail, Result};
use candle_core::{Device, IndexOp, Module, Tensor, D};
use candle_nn::Linear;
use candle_transformers::models::bert::BertModel;
use tokenizers::Tokenizer;

use crate::types::AnalysisResult;

/// Inputs longer than this many tokens are truncated, never rejected.
pub const MAX_SEQUENCE_LENGTH: usize = 512;

/// Index of the "dark pattern" class in the two-logit output.
pub const DARK_PATTERN_CLASS: usize = 1;

/// Something that maps raw text to a `[1, 2]` logit tensor over
/// {not dark pattern, dark pattern}.
pub trait SequenceClassifier: Send + Sync {
    fn logits(&self, text: &str) -> Result<Tensor>;
}

/// Softmax over the last dimension of `[1, 2]` logits, keeping the mass of the
/// dark pattern class.
pub fn score(logits: &Tensor) -> Result<AnalysisResult> {
    let probs = candle_nn::ops::softmax(logits, D::Minus1)?;
    let probs: Vec<f32> = probs.flatten_all()?.to_vec1()?;
    if probs.len() != 2 {
        bail!("expected 2 class probabilities, got {}", probs.len());
    }
    Ok(AnalysisResult::from_probability(probs[DARK_PATTERN_CLASS]))
}

/// BERT encoder plus the `BertForSequenceClassification` head: `[CLS]` hidden
/// state through the pooler (dense + tanh), then a linear layer to the labels.
pub struct BertClassifier {
    pub model: BertModel,
    pub pooler: Linear,
    pub classifier: Linear,
    pub tokenizer: Tokenizer,
    pub device: Device,
}

impl SequenceClassifier for BertClassifier {
    fn logits(&self, text: &str) -> Result<Tensor> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!(e))?;

        let token_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;
        let attention_mask =
            Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        // [1, n_tokens, hidden]
        let hidden = self
            .model
            .forward(&token_ids, &type_ids, Some(&attention_mask))?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;

        Ok(self.classifier.forward(&pooled)?)
    }
}
