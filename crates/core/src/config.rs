//! Job and pipeline configuration.
//!
//! A job file bundles everything one run needs: where output goes, which
//! targets to process, the schema, and optional transforms.
//!
//! # Example
//!
//! ```rust
//! use quarry_core::config::JobFile;
//!
//! let job = JobFile::from_json(r#"{
//!     "outputRoot": "./data",
//!     "targets": [{"url": "https://www.shicile.com/plist/kebian2011xiao-s1-e75", "name": "xiao75"}],
//!     "schema": {"baseSelector": "div.card-body", "fields": [
//!         {"name": "name", "selector": "h4.card-title", "type": "text"}
//!     ]}
//! }"#).unwrap();
//!
//! assert_eq!(job.targets[0].key(), "xiao75");
//! assert_eq!(job.concurrency, 4);
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::fetch::is_http_target;
use crate::schema::RawSchema;
use crate::shard::{MAX_NAME_CHARS, sanitize_name};
use crate::transform::TransformSpec;
use crate::{QuarryError, Result};

/// One logical target: where to fetch from and what to call the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TargetEntry")]
pub struct Target {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetEntry {
    Bare(String),
    Full { url: String, name: Option<String> },
}

impl From<TargetEntry> for Target {
    fn from(entry: TargetEntry) -> Self {
        match entry {
            TargetEntry::Bare(url) => Target { url, name: None },
            TargetEntry::Full { url, name } => Target { url, name },
        }
    }
}

impl Target {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), name: None }
    }

    pub fn named(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self { url: url.into(), name: Some(name.into()) }
    }

    /// The cache key: the explicit name, or one derived from the target.
    ///
    /// A derived key is the sanitized host and path (or file stem for local
    /// targets) followed by a short digest of the whole target, so targets
    /// differing only in query string or separators get distinct keys.
    pub fn key(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return sanitize_name(name);
        }

        if is_http_target(&self.url)
            && let Ok(url) = Url::parse(&self.url)
        {
            let host = url.host_str().unwrap_or_default();
            let path = url.path().trim_matches('/').replace('/', "_");
            let readable = if path.is_empty() { host.to_string() } else { format!("{}_{}", host, path) };
            return derived_key(&readable, url.as_str());
        }

        let stem = Path::new(&self.url).file_stem().and_then(|s| s.to_str()).unwrap_or(&self.url);
        derived_key(stem, &self.url)
    }

    /// The URL of an HTTP target, used as the base for link transforms.
    pub fn page_url(&self) -> Option<Url> {
        if is_http_target(&self.url) { Url::parse(&self.url).ok() } else { None }
    }
}

const DIGEST_CHARS: usize = 8;

fn derived_key(readable: &str, identity: &str) -> String {
    let digest = hex::encode(Sha256::digest(identity.as_bytes()));
    let base: String = sanitize_name(readable).chars().take(MAX_NAME_CHARS - DIGEST_CHARS - 1).collect();
    let base = base.trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    format!("{}-{}", base, &digest[..DIGEST_CHARS])
}

fn default_output_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_name_field() -> String {
    "name".to_string()
}

fn default_shard_extension() -> String {
    "json".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// A job description as read from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFile {
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default)]
    pub targets: Vec<Target>,
    pub schema: RawSchema,
    #[serde(default = "default_name_field")]
    pub name_field: String,
    #[serde(default = "default_shard_extension")]
    pub shard_extension: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
}

impl JobFile {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a job file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(QuarryError::FileNotFound(path.to_path_buf()));
        }
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// The pipeline settings of this job, without the schema.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            output_root: self.output_root.clone(),
            targets: self.targets.clone(),
            name_field: self.name_field.clone(),
            shard_extension: self.shard_extension.clone(),
            concurrency: self.concurrency,
            transforms: self.transforms.clone(),
        }
    }
}

/// Settings for a pipeline run.
///
/// # Example
///
/// ```rust
/// use quarry_core::{PipelineConfig, Target};
///
/// let config = PipelineConfig::builder()
///     .output_root("out")
///     .target(Target::named("https://example.com/list", "list"))
///     .concurrency(2)
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory captures and shards are written under (default: `./data`).
    pub output_root: PathBuf,

    /// Targets in processing and reporting order.
    pub targets: Vec<Target>,

    /// Record field that names shard directories (default: `name`).
    pub name_field: String,

    /// Shard file extension (default: `json`).
    pub shard_extension: String,

    /// Maximum number of targets fetched at once (default: 4).
    pub concurrency: usize,

    /// Transforms applied to freshly extracted records, in order.
    pub transforms: Vec<TransformSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            targets: Vec::new(),
            name_field: default_name_field(),
            shard_extension: default_shard_extension(),
            concurrency: default_concurrency(),
            transforms: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Checks settings that would otherwise fail mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(QuarryError::ConfigError("concurrency must be at least 1".to_string()));
        }
        if self.name_field.trim().is_empty() {
            return Err(QuarryError::ConfigError("nameField must not be empty".to_string()));
        }
        if self.shard_extension.trim_start_matches('.').is_empty() {
            return Err(QuarryError::ConfigError("shardExtension must not be empty".to_string()));
        }
        for transform in &self.transforms {
            transform.build()?;
        }

        let mut seen: HashMap<String, &Target> = HashMap::new();
        for target in &self.targets {
            if let Some(other) = seen.insert(target.key(), target)
                && other != target
            {
                return Err(QuarryError::ConfigError(format!(
                    "targets `{}` and `{}` share the capture key `{}`",
                    other.url,
                    target.url,
                    target.key()
                )));
            }
        }
        Ok(())
    }

    /// Directory a target's shards are written under.
    pub fn shard_root(&self, target: &Target) -> PathBuf {
        self.output_root.join(target.key())
    }
}

/// Builder for PipelineConfig.
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self { config: PipelineConfig::default() }
    }

    pub fn output_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.output_root = path.as_ref().to_path_buf();
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.config.targets.push(target);
        self
    }

    pub fn targets<I: IntoIterator<Item = Target>>(mut self, targets: I) -> Self {
        self.config.targets.extend(targets);
        self
    }

    pub fn name_field(mut self, value: impl Into<String>) -> Self {
        self.config.name_field = value.into();
        self
    }

    pub fn shard_extension(mut self, value: impl Into<String>) -> Self {
        self.config.shard_extension = value.into();
        self
    }

    pub fn concurrency(mut self, value: usize) -> Self {
        self.config.concurrency = value;
        self
    }

    pub fn transform(mut self, transform: TransformSpec) -> Self {
        self.config.transforms.push(transform);
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    const JOB: &str = r#"{
        "targets": [
            "https://www.shicile.com/plist/kebian2011xiao-s1-e75",
            {"url": "pages/list.html", "name": "local list"}
        ],
        "schema": {"baseSelector": "div.card-body", "fields": [
            {"name": "name", "selector": "h4.card-title", "type": "text"}
        ]},
        "transforms": [{"type": "absolutize", "field": "pinyin_url"}]
    }"#;

    #[test]
    fn test_job_defaults() {
        let job = JobFile::from_json(JOB).unwrap();
        assert_eq!(job.output_root, PathBuf::from("./data"));
        assert_eq!(job.name_field, "name");
        assert_eq!(job.shard_extension, "json");
        assert_eq!(job.concurrency, 4);
        assert_eq!(job.transforms.len(), 1);
    }

    #[test]
    fn test_target_forms() {
        let job = JobFile::from_json(JOB).unwrap();
        assert_eq!(job.targets[0], Target::new("https://www.shicile.com/plist/kebian2011xiao-s1-e75"));
        assert_eq!(job.targets[1], Target::named("pages/list.html", "local list"));
    }

    #[rstest]
    #[case(Target::named("https://example.com/a", "xiao75"), "xiao75")]
    #[case(Target::named("x", "a/b"), "ab")]
    #[case(Target::new("https://www.shicile.com/plist/kebian2011xiao-s1-e75"), "www.shicile.com_plist_kebian2011xiao-s1-e75-")]
    #[case(Target::new("https://example.com/"), "example.com-")]
    #[case(Target::new("fixtures/poems.html"), "poems-")]
    #[case(Target::named("x.html", "  "), "x-")]
    fn test_target_key(#[case] target: Target, #[case] expected: &str) {
        let key = target.key();
        if expected.ends_with('-') {
            assert!(key.starts_with(expected), "{key}");
            assert_eq!(key.len(), expected.len() + DIGEST_CHARS);
        } else {
            assert_eq!(key, expected);
        }
    }

    #[rstest]
    #[case("https://example.com/list?page=1", "https://example.com/list?page=2")]
    #[case("https://example.com/a/b", "https://example.com/a_b")]
    #[case("pages/a/list.html", "pages/b/list.html")]
    fn test_distinct_targets_get_distinct_keys(#[case] a: &str, #[case] b: &str) {
        assert_ne!(Target::new(a).key(), Target::new(b).key());
        assert_eq!(Target::new(a).key(), Target::new(a).key());
    }

    #[test]
    fn test_long_derived_key_keeps_digest() {
        let url = format!("https://example.com/{}", "segment/".repeat(40));
        let key = Target::new(url.as_str()).key();
        assert!(key.chars().count() <= MAX_NAME_CHARS);
        assert_eq!(sanitize_name(&key), key);
        assert_ne!(key, Target::new(format!("{}x", url)).key());
    }

    #[test]
    fn test_validate_rejects_colliding_names() {
        let config = PipelineConfig::builder()
            .targets([Target::named("https://a.example/", "a/b"), Target::named("https://b.example/", "ab")])
            .build();
        assert!(matches!(config.validate(), Err(QuarryError::ConfigError(msg)) if msg.contains("`ab`")));

        let same = Target::named("https://a.example/", "a");
        let repeated = PipelineConfig::builder().targets([same.clone(), same]).build();
        assert!(repeated.validate().is_ok());
    }

    #[test]
    fn test_page_url_only_for_http() {
        assert!(Target::new("https://example.com/a").page_url().is_some());
        assert!(Target::new("a.html").page_url().is_none());
    }

    #[test]
    fn test_builder_and_validate() {
        let config = PipelineConfig::builder()
            .output_root("out")
            .targets([Target::new("a.html"), Target::new("b.html")])
            .name_field("title")
            .build();
        assert_eq!(config.targets.len(), 2);
        assert!(config.validate().is_ok());
        assert_eq!(config.shard_root(&config.targets[0]), PathBuf::from("out").join(Target::new("a.html").key()));

        let bad = PipelineConfig::builder().concurrency(0).build();
        assert!(matches!(bad.validate(), Err(QuarryError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_transform_base() {
        let config = PipelineConfig::builder()
            .transform(TransformSpec::Absolutize { field: "x".into(), base: Some("::".into()) })
            .build();
        assert!(matches!(config.validate(), Err(QuarryError::InvalidUrl(_))));
    }

    #[test]
    fn test_load_job_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("job.json");
        fs::write(&path, JOB).unwrap();

        let job = JobFile::load(&path).unwrap();
        assert_eq!(job.pipeline_config().targets.len(), 2);
        assert!(matches!(JobFile::load(tmp.path().join("missing.json")), Err(QuarryError::FileNotFound(_))));
    }
}
