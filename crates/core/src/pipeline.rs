//! Capture pipeline orchestration.
//!
//! Per target the pipeline moves through
//! `Checking -> (Loading | Fetching -> Extracting -> Saving) -> Sharding -> Done`.
//! Only `Fetching` touches the outside world. A target whose capture is
//! already on disk is never fetched again, and its shards are rewritten
//! from the capture on every run.
//!
//! Targets run concurrently up to the configured limit; runs against the
//! same capture path are serialized. Failures are scoped to their target.
//!
//! # Example
//!
//! ```rust,no_run
//! use quarry_core::{FetchConfig, JobFile, Pipeline, SourceFetcher, compile};
//!
//! # async fn run() -> quarry_core::Result<()> {
//! let job = JobFile::load("job.json")?;
//! let schema = compile(&job.schema)?;
//! let fetcher = SourceFetcher::new(FetchConfig::default())?;
//!
//! let pipeline = Pipeline::new(job.pipeline_config(), schema, fetcher)?;
//! let report = pipeline.run().await;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::cache::CacheStore;
use crate::config::{PipelineConfig, Target};
use crate::extract::{ExtractConfig, extract_records_with_config};
use crate::fetch::Fetcher;
use crate::parse::Document;
use crate::record::Record;
use crate::schema::Schema;
use crate::shard::ShardWriter;
use crate::transform::{RecordTransform, apply_transforms};
use crate::{QuarryError, Result};

/// Pipeline states a target moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Checking,
    Loading,
    Fetching,
    Extracting,
    Saving,
    Sharding,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Checking => "checking",
            Stage::Loading => "loading",
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Saving => "saving",
            Stage::Sharding => "sharding",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Where a target's records came from on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// Loaded from an existing capture; nothing was fetched.
    Cache,
    /// Fetched, extracted and saved on this run.
    Fetched,
}

/// A target-scoped failure and the stage it happened in.
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct TargetError {
    pub stage: Stage,
    #[source]
    pub source: QuarryError,
}

impl TargetError {
    fn at(stage: Stage) -> impl FnOnce(QuarryError) -> TargetError {
        move |source| TargetError { stage, source }
    }
}

/// Outcome of a successful target run.
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub key: String,
    pub source: CaptureSource,
    pub capture_path: PathBuf,
    pub records: usize,
    pub shards: Vec<PathBuf>,
}

/// Result for one target, in target-list order.
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: Target,
    pub result: std::result::Result<TargetReport, TargetError>,
}

/// Results for every target of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<TargetOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&Target, &TargetReport)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|r| (&o.target, r)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&Target, &TargetError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.target, e)))
    }
}

/// Async locks keyed by capture path.
///
/// Share one registry between pipelines that write to the same output root.
/// An entry lives only while some run holds or waits for its lock.
#[derive(Debug, Default)]
pub struct CaptureLocks {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl CaptureLocks {
    pub async fn acquire(&self, path: &Path) -> CaptureGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(path.to_path_buf()).or_default().clone()
        };
        CaptureGuard { guard: Some(lock.lock_owned().await), path: path.to_path_buf(), registry: self }
    }

    /// Number of capture paths currently locked or awaited.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds a capture path's lock; releasing it forgets the path when no one else wants it.
pub struct CaptureGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    path: PathBuf,
    registry: &'a CaptureLocks,
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.registry.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(&self.path).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.path);
        }
    }
}

/// Runs targets through fetch, extraction, capture and sharding.
pub struct Pipeline<F> {
    config: PipelineConfig,
    schema: Schema,
    fetcher: F,
    extract: ExtractConfig,
    transforms: Vec<Box<dyn RecordTransform>>,
    cache: CacheStore,
    shards: ShardWriter,
    locks: Arc<CaptureLocks>,
}

impl<F: Fetcher> Pipeline<F> {
    /// Creates a pipeline, validating the configuration and building its transforms.
    pub fn new(config: PipelineConfig, schema: Schema, fetcher: F) -> Result<Self> {
        config.validate()?;
        let transforms = config.transforms.iter().map(|t| t.build()).collect::<Result<Vec<_>>>()?;

        Ok(Self {
            cache: CacheStore::new(&config.output_root),
            shards: ShardWriter::new(config.name_field.clone(), config.shard_extension.clone()),
            config,
            schema,
            fetcher,
            extract: ExtractConfig::default(),
            transforms,
            locks: Arc::default(),
        })
    }

    pub fn with_extract_config(mut self, extract: ExtractConfig) -> Self {
        self.extract = extract;
        self
    }

    /// Appends a custom transform after the configured ones.
    pub fn with_transform(mut self, transform: Box<dyn RecordTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn with_capture_locks(mut self, locks: Arc<CaptureLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Runs every configured target.
    pub async fn run(&self) -> RunReport {
        self.run_targets(&self.config.targets).await
    }

    /// Runs the given targets, reporting outcomes in the same order.
    pub async fn run_targets(&self, targets: &[Target]) -> RunReport {
        if targets.is_empty() {
            tracing::warn!("no targets to process");
        }

        let outcomes = stream::iter(targets)
            .map(|target| async move {
                let result = self.run_target(target).await;
                if let Err(e) = &result {
                    tracing::error!(url = %target.url, error = %e, "target failed");
                }
                TargetOutcome { target: target.clone(), result }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        RunReport { outcomes }
    }

    /// Runs one target to completion.
    pub async fn run_target(&self, target: &Target) -> std::result::Result<TargetReport, TargetError> {
        let key = target.key();
        let capture_path = self.cache.capture_path(&key);
        let _guard = self.locks.acquire(&capture_path).await;

        tracing::debug!(key = %key, stage = %Stage::Checking, "checking capture");
        let (records, source) = if self.cache.has(&key) {
            tracing::debug!(key = %key, stage = %Stage::Loading, "loading capture");
            let records = self.cache.load(&key).map_err(TargetError::at(Stage::Loading))?;
            (records, CaptureSource::Cache)
        } else {
            (self.capture(target, &key).await?, CaptureSource::Fetched)
        };

        tracing::debug!(key = %key, stage = %Stage::Sharding, "writing shards");
        let shard_root = self.config.shard_root(target);
        let shards = self
            .shards
            .write(&records, &shard_root)
            .map_err(TargetError::at(Stage::Sharding))?;

        tracing::info!(
            key = %key,
            source = ?source,
            records = records.len(),
            shards = shards.len(),
            stage = %Stage::Done,
            "target complete"
        );

        Ok(TargetReport { key, source, capture_path, records: records.len(), shards })
    }

    async fn capture(&self, target: &Target, key: &str) -> std::result::Result<Vec<Record>, TargetError> {
        tracing::debug!(key = %key, url = %target.url, stage = %Stage::Fetching, "fetching");
        let html = self
            .fetcher
            .fetch(&target.url)
            .await
            .map_err(TargetError::at(Stage::Fetching))?;

        tracing::debug!(key = %key, bytes = html.len(), stage = %Stage::Extracting, "extracting");
        let doc = Document::parse_with_url(&html, target.page_url());
        let mut records = extract_records_with_config(&self.schema, &doc, &self.extract);
        apply_transforms(&mut records, &self.transforms, doc.base_url());

        tracing::debug!(key = %key, stage = %Stage::Saving, "saving capture");
        match self.cache.save(key, &records) {
            Ok(_) => Ok(records),
            Err(QuarryError::CaptureExists(path)) => {
                tracing::warn!(path = %path.display(), "capture appeared concurrently, using it");
                self.cache.load(key).map_err(TargetError::at(Stage::Loading))
            }
            Err(e) => Err(TargetError { stage: Stage::Saving, source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compile_schema_str;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StaticFetcher {
        html: &'static str,
        calls: AtomicUsize,
    }

    impl Fetcher for StaticFetcher {
        async fn fetch(&self, _target: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.html.to_string())
        }
    }

    struct FailingFetcher;

    impl Fetcher for FailingFetcher {
        async fn fetch(&self, target: &str) -> Result<String> {
            Err(QuarryError::FileNotFound(PathBuf::from(target)))
        }
    }

    const HTML: &str = r#"
        <div class="card"><h4>春晓</h4></div>
        <div class="card"><h4>静夜思</h4></div>
    "#;

    fn schema() -> Schema {
        compile_schema_str(
            r#"{"baseSelector": "div.card", "fields": [{"name": "name", "selector": "h4", "kind": "text"}]}"#,
        )
        .unwrap()
    }

    fn block_on<T>(future: impl Future<Output = T>) -> T {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Fetching.to_string(), "fetching");
        let err = TargetError { stage: Stage::Saving, source: QuarryError::ConfigError("x".into()) };
        assert!(err.to_string().starts_with("saving failed"));
    }

    #[test]
    fn test_second_run_hits_cache() {
        let tmp = TempDir::new().unwrap();
        let config = PipelineConfig::builder()
            .output_root(tmp.path())
            .target(Target::named("https://example.com/list", "list"))
            .build();
        let fetcher = StaticFetcher { html: HTML, calls: AtomicUsize::new(0) };
        let pipeline = Pipeline::new(config, schema(), fetcher).unwrap();

        let first = block_on(pipeline.run());
        let second = block_on(pipeline.run());

        assert_eq!(pipeline.fetcher.calls.load(Ordering::SeqCst), 1);
        let (_, a) = first.succeeded().next().unwrap();
        let (_, b) = second.succeeded().next().unwrap();
        assert_eq!(a.source, CaptureSource::Fetched);
        assert_eq!(b.source, CaptureSource::Cache);
        assert_eq!(a.shards, b.shards);
        assert_eq!(a.shards[1], tmp.path().join("list").join("2.静夜思").join("静夜思.json"));
    }

    #[test]
    fn test_duplicate_targets_fetch_once() {
        let tmp = TempDir::new().unwrap();
        let target = Target::named("https://example.com/list", "list");
        let config = PipelineConfig::builder()
            .output_root(tmp.path())
            .targets([target.clone(), target])
            .concurrency(2)
            .build();
        let fetcher = StaticFetcher { html: HTML, calls: AtomicUsize::new(0) };
        let pipeline = Pipeline::new(config, schema(), fetcher).unwrap();

        let report = block_on(pipeline.run());

        assert!(report.is_success());
        assert_eq!(pipeline.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fetch_failure_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let config = PipelineConfig::builder()
            .output_root(tmp.path())
            .target(Target::named("missing.html", "missing"))
            .build();
        let pipeline = Pipeline::new(config, schema(), FailingFetcher).unwrap();

        let report = block_on(pipeline.run());

        let (_, err) = report.failed().next().unwrap();
        assert_eq!(err.stage, Stage::Fetching);
        assert!(!pipeline.cache().has("missing"));
        assert!(!tmp.path().join("missing").exists());
    }

    #[test]
    fn test_capture_locks_are_released() {
        let locks = CaptureLocks::default();
        let path = Path::new("data/list.json");

        block_on(async {
            let first = locks.acquire(path).await;
            assert_eq!(locks.len(), 1);
            drop(first);
            assert!(locks.is_empty());

            let _a = locks.acquire(path).await;
            let _b = locks.acquire(Path::new("data/other.json")).await;
            assert_eq!(locks.len(), 2);
        });
        assert!(locks.is_empty());
    }

    #[test]
    fn test_shared_locks_empty_after_run() {
        let tmp = TempDir::new().unwrap();
        let target = Target::named("https://example.com/list", "list");
        let config = PipelineConfig::builder()
            .output_root(tmp.path())
            .targets([target.clone(), target, Target::named("https://example.com/b", "b")])
            .concurrency(3)
            .build();
        let locks = Arc::new(CaptureLocks::default());
        let fetcher = StaticFetcher { html: HTML, calls: AtomicUsize::new(0) };
        let pipeline = Pipeline::new(config, schema(), fetcher).unwrap().with_capture_locks(locks.clone());

        assert!(block_on(pipeline.run()).is_success());
        assert!(locks.is_empty());
    }

    #[test]
    fn test_unwritable_root_fails_at_saving() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("root");
        std::fs::write(&blocker, "").unwrap();
        let config = PipelineConfig::builder()
            .output_root(&blocker)
            .target(Target::named("https://example.com/list", "list"))
            .build();
        let fetcher = StaticFetcher { html: HTML, calls: AtomicUsize::new(0) };
        let pipeline = Pipeline::new(config, schema(), fetcher).unwrap();

        let report = block_on(pipeline.run());

        let (_, err) = report.failed().next().unwrap();
        assert_eq!(err.stage, Stage::Saving);
        assert!(matches!(err.source, QuarryError::CacheWrite { .. }));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig::builder().concurrency(0).build();
        assert!(Pipeline::new(config, schema(), FailingFetcher).is_err());
    }
}
