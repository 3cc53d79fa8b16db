pub mod blob;
pub mod config;
pub mod db;
pub mod error;
pub mod ipc;
pub mod models;
pub mod usage;

pub use blob::{create_blob_store, BlobStore, FsBlobStore, InMemoryBlobStore, S3BlobStore};
pub use config::ForgeConfig;
pub use error::ForgeError;
pub use models::{
    ExecutionLogRecord, LogReference, ModelUsage, SummaryDraft, TraceKey, TraceSnapshot,
    TraceStats, TraceSummary, UsageRollup,
};
pub use usage::{UsageCounters, UsageRegistry, UsageSchema};
