//! Schema-driven extraction of structured records from HTML, with an
//! idempotent capture store and per-record shard output.
//!
//! The usual flow is: compile a [`RawSchema`] into a [`Schema`], hand it
//! to a [`Pipeline`] together with a [`Fetcher`], and run it. Each target
//! is fetched at most once; later runs load the capture and rewrite the
//! shards from it.

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod parse;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod shard;
pub mod store;
pub mod transform;

pub use cache::CacheStore;
pub use config::{JobFile, PipelineConfig, PipelineConfigBuilder, Target};
pub use error::{QuarryError, Result, ValidationError};
pub use extract::{ExtractConfig, extract_records, extract_records_with_config};
#[cfg(feature = "fetch")]
pub use fetch::{HttpFetcher, fetch_url};
pub use fetch::{FetchConfig, Fetcher, FileFetcher, SourceFetcher, fetch_file, fetch_stdin};
pub use parse::{Document, Element};
pub use pipeline::{CaptureGuard, CaptureLocks, CaptureSource, Pipeline, RunReport, Stage, TargetError, TargetOutcome, TargetReport};
pub use record::{FieldValue, Record};
pub use schema::{FieldKind, FieldSpec, RawField, RawSchema, Schema, compile, compile_schema_str, load_schema_file};
pub use shard::{ShardWriter, sanitize_name};
pub use transform::{AbsolutizeUrl, RecordTransform, TransformSpec, apply_transforms};
