use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tokenizers::{Tokenizer, TruncationParams};

use crate::classifier::{BertClassifier, MAX_SEQUENCE_LENGTH};
use crate::config::{DeviceKind, ModelConfig};

/// The handful of `config.json` fields the classification head needs that the
/// candle BERT config does not expose.
#[derive(Debug, Deserialize)]
struct HeadConfig {
    hidden_size: usize,
    #[serde(default)]
    num_labels: Option<usize>,
    #[serde(default)]
    id2label: Option<HashMap<String, String>>,
}

impl HeadConfig {
    fn num_labels(&self) -> usize {
        self.id2label
            .as_ref()
            .map(HashMap::len)
            .or(self.num_labels)
            .unwrap_or(2)
    }
}

pub fn device(kind: DeviceKind) -> Result<Device> {
    let device = match kind {
        DeviceKind::Cpu => Device::Cpu,
        DeviceKind::Cuda => Device::new_cuda(0).context("initializing CUDA device")?,
        DeviceKind::Metal => Device::new_metal(0).context("initializing Metal device")?,
    };
    Ok(device)
}

/// Downloads (or reuses the hub cache for) the configured repository and
/// builds the classifier. Tokenizer and weights are only returned together.
pub fn build_model_and_tokenizer(config: &ModelConfig) -> Result<BertClassifier> {
    let api = Api::new().context("creating hub client")?;
    let repo = api.repo(Repo::with_revision(
        config.model_id.clone(),
        RepoType::Model,
        config.revision.clone(),
    ));

    let config_path = repo.get("config.json").context("fetching config.json")?;
    let raw_config = std::fs::read_to_string(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let bert_config: Config =
        serde_json::from_str(&raw_config).context("parsing BERT config")?;
    let head: HeadConfig = serde_json::from_str(&raw_config).context("parsing head config")?;

    let num_labels = head.num_labels();
    if num_labels != 2 {
        bail!("expected a binary classifier, config declares {num_labels} labels");
    }

    let tokenizer = load_tokenizer(&repo)?;
    let device = device(config.device)?;
    let vb = load_weights(&repo, &device)?;

    let model = BertModel::load(vb.pp("bert"), &bert_config).context("building BERT encoder")?;
    let pooler = candle_nn::linear(head.hidden_size, head.hidden_size, vb.pp("bert.pooler.dense"))
        .context("loading pooler")?;
    let classifier = candle_nn::linear(head.hidden_size, num_labels, vb.pp("classifier"))
        .context("loading classification head")?;

    tracing::info!(
        model = %config.model_id,
        revision = %config.revision,
        hidden_size = head.hidden_size,
        vocab_size = tokenizer.get_vocab_size(true),
        "classifier built"
    );

    Ok(BertClassifier {
        model,
        pooler,
        classifier,
        tokenizer,
        device,
    })
}

fn load_weights(repo: &ApiRepo, device: &Device) -> Result<VarBuilder<'static>> {
    if let Ok(path) = repo.get("model.safetensors") {
        tracing::debug!(path = %path.display(), "loading safetensors weights");
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };
        return Ok(vb);
    }

    let path = repo
        .get("pytorch_model.bin")
        .context("no weights found (tried model.safetensors, pytorch_model.bin)")?;
    tracing::debug!(path = %path.display(), "loading pytorch weights");
    Ok(VarBuilder::from_pth(path, DType::F32, device)?)
}

fn load_tokenizer(repo: &ApiRepo) -> Result<Tokenizer> {
    let mut tokenizer = match repo.get("tokenizer.json") {
        Ok(path) => Tokenizer::from_file(&path).map_err(|e| anyhow::anyhow!(e))?,
        Err(_) => {
            let vocab = repo
                .get("vocab.txt")
                .context("no tokenizer found (tried tokenizer.json, vocab.txt)")?;
            wordpiece_tokenizer(&vocab)?
        }
    };
    prepare_tokenizer(&mut tokenizer)?;

    Ok(tokenizer)
}

/// Single-sequence inference settings: no padding, right truncation to
/// [`MAX_SEQUENCE_LENGTH`] tokens including `[CLS]`/`[SEP]`.
pub fn prepare_tokenizer(tokenizer: &mut Tokenizer) -> Result<()> {
    tokenizer
        .with_padding(None)
        .with_truncation(Some(TruncationParams {
            max_length: MAX_SEQUENCE_LENGTH,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

/// Uncased BERT WordPiece tokenizer for repositories that only ship `vocab.txt`.
pub fn wordpiece_tokenizer(vocab: &Path) -> Result<Tokenizer> {
    use tokenizers::models::wordpiece::WordPiece;
    use tokenizers::normalizers::BertNormalizer;
    use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
    use tokenizers::processors::bert::BertProcessing;

    let wordpiece = WordPiece::from_file(&vocab.to_string_lossy())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    let special = |token: &str| {
        tokenizer
            .token_to_id(token)
            .map(|id| (token.to_string(), id))
            .with_context(|| format!("vocabulary has no {token} token"))
    };
    let cls = special("[CLS]")?;
    let sep = special("[SEP]")?;

    tokenizer.with_normalizer(Some(BertNormalizer::default()));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
    tokenizer.with_post_processor(Some(BertProcessing::new(sep, cls)));

    Ok(tokenizer)
}
