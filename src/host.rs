//! Process-wide owner of the loaded classifier.
//!
//! The host moves through `uninitialized -> loading -> ready`. Loading runs in
//! a spawned task guarded by a [`OnceCell`], so concurrent callers of
//! [`ModelHost::ensure_ready`] share a single load and never observe a
//! half-built tokenizer/model pair. A failed load leaves the cell empty and the
//! next caller starts over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::OnceCell;

use crate::classifier::{self, SequenceClassifier};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::model::build_model_and_tokenizer;
use crate::types::{AnalysisResult, ModelStatus};

/// Produces a ready classifier. Runs on a blocking thread.
pub trait ModelLoader: Send + Sync + 'static {
    /// Identifier used in logs and load errors.
    fn model_id(&self) -> &str;

    fn load(&self) -> Result<Arc<dyn SequenceClassifier>>;
}

/// Loads the BERT classifier from the Hugging Face hub.
pub struct HubLoader {
    config: ModelConfig,
}

impl HubLoader {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }
}

impl ModelLoader for HubLoader {
    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    fn load(&self) -> Result<Arc<dyn SequenceClassifier>> {
        Ok(Arc::new(build_model_and_tokenizer(&self.config)?))
    }
}

pub struct ModelHost {
    inner: Arc<HostState>,
}

struct HostState {
    loader: Arc<dyn ModelLoader>,
    classifier: OnceCell<Arc<dyn SequenceClassifier>>,
    loading: AtomicBool,
}

impl ModelHost {
    pub fn new(loader: impl ModelLoader) -> Self {
        Self {
            inner: Arc::new(HostState {
                loader: Arc::new(loader),
                classifier: OnceCell::new(),
                loading: AtomicBool::new(false),
            }),
        }
    }

    pub fn model_id(&self) -> &str {
        self.inner.loader.model_id()
    }

    pub fn status(&self) -> ModelStatus {
        if self.inner.classifier.initialized() {
            ModelStatus::Ready
        } else if self.inner.loading.load(Ordering::Acquire) {
            ModelStatus::Loading
        } else {
            ModelStatus::Uninitialized
        }
    }

    /// Loads the classifier unless it is already loaded. Safe to call from any
    /// number of tasks at once; only one of them performs the load.
    ///
    /// The load runs in its own task, so dropping the returned future (a
    /// client hanging up mid-load) does not abandon it and later callers join
    /// the same load.
    pub async fn ensure_ready(&self) -> Result<(), ModelError> {
        if self.inner.classifier.initialized() {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner
                .classifier
                .get_or_try_init(|| inner.load())
                .await
                .map(|_| ())
        })
        .await
        .map_err(|e| ModelError::Load {
            model: self.model_id().to_string(),
            source: e.into(),
        })?
    }

    /// Scores `text`. Blocking; call from a blocking context once
    /// [`ensure_ready`](Self::ensure_ready) has succeeded.
    pub fn infer(&self, text: &str) -> Result<AnalysisResult, ModelError> {
        let classifier = self.inner.classifier.get().ok_or(ModelError::NotReady)?;

        let start = Instant::now();
        let result = classifier
            .logits(text)
            .and_then(|logits| classifier::score(&logits))
            .map_err(ModelError::Inference)?;
        tracing::debug!(elapsed = ?start.elapsed(), %result, "inference done");

        Ok(result)
    }
}

impl HostState {
    async fn load(&self) -> Result<Arc<dyn SequenceClassifier>, ModelError> {
        let _loading = LoadingFlag::raise(&self.loading);
        let model = self.loader.model_id().to_string();
        tracing::info!(%model, "loading model and tokenizer");

        let start = Instant::now();
        let loader = Arc::clone(&self.loader);
        let loaded = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(anyhow::Error::from)
            .and_then(|result| result);

        match loaded {
            Ok(classifier) => {
                tracing::info!(%model, elapsed = ?start.elapsed(), "model and tokenizer loaded");
                Ok(classifier)
            }
            Err(source) => {
                tracing::error!(%model, error = ?source, "error loading model");
                Err(ModelError::Load { model, source })
            }
        }
    }
}

/// Marks a load in progress for [`ModelHost::status`], cleared on drop so a
/// cancelled or failed load does not stick.
struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Tensor};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FixedLogits([f32; 2]);

    impl SequenceClassifier for FixedLogits {
        fn logits(&self, _text: &str) -> Result<Tensor> {
            Ok(Tensor::new(&[self.0], &Device::Cpu)?)
        }
    }

    struct Broken;

    impl SequenceClassifier for Broken {
        fn logits(&self, _text: &str) -> Result<Tensor> {
            anyhow::bail!("tokenizer exploded")
        }
    }

    /// Fails the first `failures` loads, then succeeds. Counts every attempt.
    #[derive(Clone)]
    struct ScriptedLoader {
        attempts: Arc<AtomicUsize>,
        failures: usize,
        delay: Duration,
        logits: [f32; 2],
    }

    impl ScriptedLoader {
        fn new(failures: usize) -> Self {
            Self {
                attempts: Arc::new(AtomicUsize::new(0)),
                failures,
                delay: Duration::ZERO,
                logits: [0.0, 2.0],
            }
        }
    }

    impl ModelLoader for ScriptedLoader {
        fn model_id(&self) -> &str {
            "test/scripted"
        }

        fn load(&self) -> Result<Arc<dyn SequenceClassifier>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if attempt < self.failures {
                anyhow::bail!("hub unreachable (attempt {attempt})");
            }
            Ok(Arc::new(FixedLogits(self.logits)))
        }
    }

    struct BrokenLoader;

    impl ModelLoader for BrokenLoader {
        fn model_id(&self) -> &str {
            "test/broken"
        }

        fn load(&self) -> Result<Arc<dyn SequenceClassifier>> {
            Ok(Arc::new(Broken))
        }
    }

    #[tokio::test]
    async fn starts_uninitialized_and_refuses_inference() {
        let host = ModelHost::new(ScriptedLoader::new(0));
        assert_eq!(host.status(), ModelStatus::Uninitialized);
        assert!(matches!(host.infer("hello"), Err(ModelError::NotReady)));
    }

    #[tokio::test]
    async fn sequential_calls_load_once() {
        let loader = ScriptedLoader::new(0);
        let attempts = Arc::clone(&loader.attempts);
        let host = ModelHost::new(loader);

        for _ in 0..5 {
            host.ensure_ready().await.unwrap();
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(host.status(), ModelStatus::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_load_once() {
        let mut loader = ScriptedLoader::new(0);
        loader.delay = Duration::from_millis(50);
        let attempts = Arc::clone(&loader.attempts);
        let host = Arc::new(ModelHost::new(loader));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let host = Arc::clone(&host);
                tokio::spawn(async move { host.ensure_ready().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_is_retried_by_next_call() {
        let loader = ScriptedLoader::new(1);
        let attempts = Arc::clone(&loader.attempts);
        let host = ModelHost::new(loader);

        let err = host.ensure_ready().await.unwrap_err();
        assert!(matches!(err, ModelError::Load { .. }));
        assert!(err.to_string().contains("hub unreachable"));
        assert_eq!(host.status(), ModelStatus::Uninitialized);

        host.ensure_ready().await.unwrap();
        assert_eq!(host.status(), ModelStatus::Ready);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reports_loading_while_in_flight() {
        let mut loader = ScriptedLoader::new(0);
        loader.delay = Duration::from_millis(200);
        let host = Arc::new(ModelHost::new(loader));

        let pending = {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.ensure_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(host.status(), ModelStatus::Loading);

        pending.await.unwrap().unwrap();
        assert_eq!(host.status(), ModelStatus::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_caller_does_not_abandon_load() {
        let mut loader = ScriptedLoader::new(0);
        loader.delay = Duration::from_millis(300);
        let attempts = Arc::clone(&loader.attempts);
        let host = Arc::new(ModelHost::new(loader));

        let first = {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.ensure_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());

        // The load keeps running on its own task.
        assert_eq!(host.status(), ModelStatus::Loading);

        host.ensure_ready().await.unwrap();
        assert_eq!(host.status(), ModelStatus::Ready);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn infer_scores_class_one() {
        let mut loader = ScriptedLoader::new(0);
        loader.logits = [2.0, 0.0];
        let host = ModelHost::new(loader);
        host.ensure_ready().await.unwrap();

        let result = host.infer("Only 2 left in stock! Buy now!").unwrap();
        assert!(result.probability < 0.5);
        assert!(!result.is_dark_pattern);
        assert_eq!(result.confidence, result.probability);
    }

    #[tokio::test]
    async fn inference_failure_is_typed() {
        let host = ModelHost::new(BrokenLoader);
        host.ensure_ready().await.unwrap();

        let err = host.infer("anything").unwrap_err();
        assert!(matches!(err, ModelError::Inference(_)));
        assert!(err.to_string().contains("tokenizer exploded"));
    }

    #[test]
    fn loading_flag_clears_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _raised = LoadingFlag::raise(&flag);
            assert!(flag.load(Ordering::SeqCst));
        }
        assert!(!flag.load(Ordering::SeqCst));
    }
}
