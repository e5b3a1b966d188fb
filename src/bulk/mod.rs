//! Bulk job engines. Every generation shares the job table and the
//! per-record processor; each has its own state machine and wire format.

pub mod csv;
pub mod ingest;
pub mod job;
pub mod processor;
pub mod query;
pub mod v1;
pub mod xml;

pub use ingest::{IngestEngine, IngestJobRequest};
pub use job::{BatchState, BulkJob, JobState, JobStore, JobType, Operation, RecordResult};
pub use processor::RecordProcessor;
pub use query::{BulkQueryEngine, QueryJobRequest, QueryResults};
pub use v1::{LegacyBulkEngine, ResultDocument};
