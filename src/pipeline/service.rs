//! The inference service: readiness-gated `analyze` over a shared loaded pipeline.

use super::config::ServiceConfig;
use super::stats::{AnalysisStats, StatsRecorder};
use crate::core::AcneError;
use crate::core::config::ConfigValidator;
use crate::domain::PredictionResult;
use crate::models::{ClassifierSource, FeatureExtractor, select_classifier};
use crate::processors::ImagePreprocessor;
use image::DynamicImage;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// The loaded, immutable inference pipeline.
#[derive(Debug)]
pub struct LoadedPipeline {
    preprocessor: ImagePreprocessor,
    extractor: Arc<dyn FeatureExtractor>,
    classifier: ClassifierSource,
}

impl LoadedPipeline {
    /// Assembles a pipeline, checking that the classifier accepts the extractor's output.
    pub fn new(
        extractor: Arc<dyn FeatureExtractor>,
        classifier: ClassifierSource,
    ) -> Result<Self, AcneError> {
        if classifier.input_dim() != extractor.embedding_dim() {
            return Err(AcneError::model_load_message(
                extractor.name(),
                format!(
                    "{} expects {}-wide input but extractor produces {}",
                    classifier.kind(),
                    classifier.input_dim(),
                    extractor.embedding_dim()
                ),
                Some("use the extractor the classifier was trained with"),
            ));
        }
        if let ClassifierSource::TrainedHead {
            extractor: trained_with,
            ..
        } = &classifier
        {
            if trained_with.name != extractor.name() {
                warn!(
                    "classifier was trained on '{}' embeddings but '{}' is loaded",
                    trained_with.name,
                    extractor.name()
                );
            }
        }
        Ok(Self {
            preprocessor: ImagePreprocessor::new(),
            extractor,
            classifier,
        })
    }

    pub fn classifier(&self) -> &ClassifierSource {
        &self.classifier
    }

    pub fn extractor(&self) -> &dyn FeatureExtractor {
        self.extractor.as_ref()
    }

    fn run(&self, image: &DynamicImage) -> Result<PredictionResult, AcneError> {
        let tensor = self.preprocessor.preprocess(image)?;
        let embedding = self.extractor.embed(&tensor)?;
        drop(tensor);
        let probabilities = self.classifier.probabilities(&embedding)?;
        PredictionResult::from_probabilities(&probabilities, self.classifier.labels())
    }
}

/// Public view of the loading state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Unloaded,
    Loading,
    Ready,
    /// Loading failed; calling `load` again retries.
    Failed(String),
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => f.write_str("unloaded"),
            Self::Loading => f.write_str("loading"),
            Self::Ready => f.write_str("ready"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

enum State {
    Unloaded,
    Loading,
    Ready(Arc<LoadedPipeline>),
    Failed(String),
}

impl State {
    fn readiness(&self) -> Readiness {
        match self {
            Self::Unloaded => Readiness::Unloaded,
            Self::Loading => Readiness::Loading,
            Self::Ready(_) => Readiness::Ready,
            Self::Failed(reason) => Readiness::Failed(reason.clone()),
        }
    }
}

/// Classifies images once the extractor and classifier are loaded.
///
/// Loading is explicit ([`load`](Self::load) or
/// [`load_in_background`](Self::load_in_background)). Until it completes every
/// `analyze*` call fails fast with `ModelNotReady`. Once ready, calls are reentrant:
/// they share the loaded pipeline through an `Arc` and allocate their own tensors.
pub struct InferenceService {
    config: ServiceConfig,
    state: Mutex<State>,
    state_changed: Condvar,
    stats: StatsRecorder,
}

impl fmt::Debug for InferenceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceService")
            .field("readiness", &self.readiness())
            .field("classifier_path", &self.config.classifier_path)
            .finish()
    }
}

impl InferenceService {
    /// Creates an unloaded service.
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::Unloaded),
            state_changed: Condvar::new(),
            stats: StatsRecorder::new(),
        }
    }

    /// Creates a service that is immediately ready with `pipeline`.
    pub fn from_pipeline(config: ServiceConfig, pipeline: LoadedPipeline) -> Self {
        let service = Self::new(config);
        *service.lock_state() = State::Ready(Arc::new(pipeline));
        service
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn readiness(&self) -> Readiness {
        self.lock_state().readiness()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.lock_state(), State::Ready(_))
    }

    pub fn stats(&self) -> AnalysisStats {
        self.stats.snapshot()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the extractor and classifier, blocking until done.
    ///
    /// If another load is already running this waits for it and reports its outcome.
    /// A previous failure is retried. A ready service keeps its pipeline and returns
    /// `Ok` without reloading.
    ///
    /// # Errors
    ///
    /// The load error (usually `ModelLoad`, or `ConfigError` for an invalid
    /// configuration); the service is then `Failed`.
    pub fn load(&self) -> Result<(), AcneError> {
        if self.begin_loading() {
            self.finish_loading()
        } else {
            self.wait_for_load(None)
        }
    }

    /// Starts loading on a background thread and returns immediately.
    pub fn load_in_background(self: &Arc<Self>) -> JoinHandle<Result<(), AcneError>> {
        let owns_load = self.begin_loading();
        let service = Arc::clone(self);
        std::thread::spawn(move || {
            if owns_load {
                service.finish_loading()
            } else {
                service.wait_for_load(None)
            }
        })
    }

    /// Blocks until loading finishes or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// `ModelNotReady` when the service is not ready when the wait ends.
    pub fn wait_until_ready(&self, timeout: Duration) -> Result<(), AcneError> {
        self.wait_for_load(Some(timeout))
    }

    fn begin_loading(&self) -> bool {
        let mut state = self.lock_state();
        if matches!(*state, State::Loading | State::Ready(_)) {
            return false;
        }
        *state = State::Loading;
        true
    }

    fn finish_loading(&self) -> Result<(), AcneError> {
        let started = Instant::now();
        let outcome = self.load_pipeline();
        let mut state = self.lock_state();
        let result = match outcome {
            Ok(pipeline) => {
                info!(
                    "inference service ready with {} in {:.2?}",
                    pipeline.classifier.kind(),
                    started.elapsed()
                );
                *state = State::Ready(Arc::new(pipeline));
                Ok(())
            }
            Err(e) => {
                error!("failed to load inference models: {}", e);
                *state = State::Failed(e.to_string());
                Err(e)
            }
        };
        drop(state);
        self.state_changed.notify_all();
        result
    }

    fn load_pipeline(&self) -> Result<LoadedPipeline, AcneError> {
        self.config.validate()?;
        let extractor = self.config.extractor.load()?;
        let classifier = select_classifier(
            self.config.classifier_path.as_deref(),
            self.config.allow_passthrough,
            &self.config.labels,
        )?;
        if classifier.labels() != &self.config.labels {
            debug!(
                "artifact labels (version {}) differ from configured labels; \
                 using artifact labels",
                classifier.labels().version()
            );
        }
        LoadedPipeline::new(extractor, classifier)
    }

    fn wait_for_load(&self, timeout: Option<Duration>) -> Result<(), AcneError> {
        let guard = self.lock_state();
        let is_loading = |state: &mut State| matches!(state, State::Loading);
        let guard = match timeout {
            Some(timeout) => {
                self.state_changed
                    .wait_timeout_while(guard, timeout, is_loading)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .state_changed
                .wait_while(guard, is_loading)
                .unwrap_or_else(PoisonError::into_inner),
        };
        match &*guard {
            State::Ready(_) => Ok(()),
            other => Err(AcneError::model_not_ready(other.readiness())),
        }
    }

    fn pipeline(&self) -> Result<Arc<LoadedPipeline>, AcneError> {
        match &*self.lock_state() {
            State::Ready(pipeline) => Ok(Arc::clone(pipeline)),
            other => Err(AcneError::model_not_ready(other.readiness())),
        }
    }

    /// Classifies a decoded image.
    ///
    /// # Errors
    ///
    /// * `ModelNotReady` unless the service is ready.
    /// * `Analysis` wrapping any failure after that; the service stays ready.
    pub fn analyze(&self, image: &DynamicImage) -> Result<PredictionResult, AcneError> {
        let pipeline = self.pipeline()?;
        self.timed(|| pipeline.run(image))
    }

    /// Decodes and classifies encoded image bytes.
    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<PredictionResult, AcneError> {
        let pipeline = self.pipeline()?;
        self.timed(|| {
            let image = ImagePreprocessor::decode(bytes)?;
            pipeline.run(&image)
        })
    }

    /// Opens and classifies an image file.
    pub fn analyze_path(&self, path: &Path) -> Result<PredictionResult, AcneError> {
        let pipeline = self.pipeline()?;
        self.timed(|| {
            let image = ImagePreprocessor::open(path)?;
            pipeline.run(&image)
        })
    }

    /// Classifies a raw interleaved pixel buffer with 1 to 4 channels.
    pub fn analyze_raw(
        &self,
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<PredictionResult, AcneError> {
        let pipeline = self.pipeline()?;
        self.timed(|| {
            let image = ImagePreprocessor::from_raw_pixels(width, height, channels, data)?;
            pipeline.run(&image)
        })
    }

    fn timed(
        &self,
        run: impl FnOnce() -> Result<PredictionResult, AcneError>,
    ) -> Result<PredictionResult, AcneError> {
        let started = Instant::now();
        let result = run();
        self.stats.record(result.is_ok(), started.elapsed());
        result.map_err(|e| {
            debug!("analysis failed: {}", e);
            AcneError::analysis("image analysis failed", e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LabelSet;
    use crate::models::ExtractorSpec;
    use image::{Rgb, RgbImage};

    fn rgb_labels() -> LabelSet {
        LabelSet::new(1, vec!["red".into(), "green".into(), "blue".into()]).unwrap()
    }

    /// Grid 1 gives a 3-wide embedding (mean RGB), matching three labels in passthrough.
    fn passthrough_config() -> ServiceConfig {
        ServiceConfig::new(ExtractorSpec::PooledColor { grid: 1 })
            .with_passthrough(true)
            .with_labels(rgb_labels())
    }

    fn solid(color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb(color)))
    }

    #[test]
    fn test_analyze_before_load_is_not_ready() {
        let service = InferenceService::new(passthrough_config());
        assert_eq!(service.readiness(), Readiness::Unloaded);
        let err = service.analyze(&solid([255, 0, 0])).unwrap_err();
        assert!(matches!(err, AcneError::ModelNotReady { .. }));
        let err = service
            .wait_until_ready(Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, AcneError::ModelNotReady { .. }));
    }

    #[test]
    fn test_passthrough_analyze() {
        let service = InferenceService::new(passthrough_config());
        service.load().unwrap();
        assert!(service.is_ready());

        let result = service.analyze(&solid([0, 0, 255])).unwrap();
        assert_eq!(result.top_prediction.class_name, "blue");
        assert_eq!(result.all_predictions.len(), 3);
        assert!((result.total_percentage() - 100.0).abs() < 1e-3);
        assert_eq!(service.stats().successful, 1);
    }

    #[test]
    fn test_failures_do_not_poison_ready_state() {
        let service = InferenceService::new(passthrough_config());
        service.load().unwrap();

        let err = service.analyze_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, AcneError::Analysis { .. }));
        let err = service.analyze_raw(2, 2, 3, vec![0; 5]).unwrap_err();
        assert!(matches!(err, AcneError::Analysis { .. }));

        assert!(service.is_ready());
        assert!(service.analyze(&solid([255, 0, 0])).is_ok());
        let stats = service.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.successful, 1);
    }

    #[test]
    fn test_failed_load_is_retryable() {
        let root = tempfile::tempdir().unwrap();
        let artifact = root.path().join("artifact");
        let config = ServiceConfig::new(ExtractorSpec::PooledColor { grid: 1 })
            .with_classifier_path(&artifact)
            .with_labels(rgb_labels());
        let service = InferenceService::new(config);

        let err = service.load().unwrap_err();
        assert!(matches!(err, AcneError::ModelLoad { .. }));
        assert!(matches!(service.readiness(), Readiness::Failed(_)));
        assert!(matches!(
            service.analyze(&solid([0, 0, 0])).unwrap_err(),
            AcneError::ModelNotReady { .. }
        ));

        let model = crate::models::ClassifierModel::build(
            3,
            3,
            &crate::models::HeadConfig::new().with_hidden_units(vec![4]),
        )
        .unwrap();
        let identity = crate::models::ExtractorIdentity {
            name: "pooled-color-1x1".into(),
            embedding_dim: 3,
        };
        crate::models::save_artifact(&artifact, &model, &rgb_labels(), &identity).unwrap();

        service.load().unwrap();
        assert!(service.analyze(&solid([10, 200, 30])).is_ok());
    }

    #[test]
    fn test_reload_of_ready_service_keeps_pipeline() {
        let root = tempfile::tempdir().unwrap();
        let artifact = root.path().join("artifact");
        let model = crate::models::ClassifierModel::build(
            3,
            3,
            &crate::models::HeadConfig::new().with_hidden_units(vec![4]),
        )
        .unwrap();
        let identity = crate::models::ExtractorIdentity {
            name: "pooled-color-1x1".into(),
            embedding_dim: 3,
        };
        crate::models::save_artifact(&artifact, &model, &rgb_labels(), &identity).unwrap();
        let service = Arc::new(InferenceService::new(
            ServiceConfig::new(ExtractorSpec::PooledColor { grid: 1 })
                .with_classifier_path(&artifact)
                .with_labels(rgb_labels()),
        ));
        service.load().unwrap();

        std::fs::remove_dir_all(&artifact).unwrap();
        service.load().unwrap();
        assert_eq!(service.readiness(), Readiness::Ready);
        assert!(service.analyze(&solid([0, 0, 255])).is_ok());
        service.load_in_background().join().unwrap().unwrap();
        assert!(service.is_ready());
    }

    #[test]
    fn test_invalid_config_fails_load() {
        // Neither an artifact path nor passthrough.
        let service = InferenceService::new(
            ServiceConfig::new(ExtractorSpec::PooledColor { grid: 1 }).with_labels(rgb_labels()),
        );
        let err = service.load().unwrap_err();
        assert!(matches!(err, AcneError::ConfigError { .. }));
        assert!(matches!(service.readiness(), Readiness::Failed(_)));
    }

    #[test]
    fn test_width_mismatch_fails_load() {
        // Grid 2 produces 12 values, but passthrough needs exactly 3.
        let config = ServiceConfig::new(ExtractorSpec::PooledColor { grid: 2 })
            .with_passthrough(true)
            .with_labels(rgb_labels());
        let service = InferenceService::new(config);
        assert!(matches!(
            service.load().unwrap_err(),
            AcneError::ModelLoad { .. }
        ));
    }

    #[test]
    fn test_background_load_and_concurrent_analyze() {
        let service = Arc::new(InferenceService::new(passthrough_config()));
        let handle = service.load_in_background();
        service.wait_until_ready(Duration::from_secs(30)).unwrap();
        handle.join().unwrap().unwrap();

        let colors = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [200, 10, 10]];
        let expected = ["red", "green", "blue", "red"];
        let workers: Vec<_> = colors
            .iter()
            .map(|&color| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    (0..5)
                        .map(|_| service.analyze(&solid(color)).unwrap())
                        .last()
                        .unwrap()
                })
            })
            .collect();
        for (worker, name) in workers.into_iter().zip(expected) {
            let result = worker.join().unwrap();
            assert_eq!(result.top_prediction.class_name, name);
        }
        assert_eq!(service.stats().total_requests, 20);
    }
}
