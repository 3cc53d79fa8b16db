pub mod log;
pub mod snapshot;
pub mod stats;
pub mod summary;
pub mod trace_key;

pub use log::ExecutionLogRecord;
pub use snapshot::{LogReference, TraceSnapshot};
pub use stats::{ModelUsage, TraceStats, UsageRollup};
pub use summary::{SummaryDraft, TraceSummary};
pub use trace_key::TraceKey;
