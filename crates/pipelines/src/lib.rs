//! Capture and ingestion pipelines.
//!
//! Capture turns local domain writes into ledger events after the
//! surrounding transaction commits; ingestion applies batches pushed by
//! peer stations and fans the resulting events back out. Both run as
//! background jobs so the request path never waits on fan-out.

pub mod capture;
pub mod ingest;

pub use capture::{
    CaptureJob, CaptureJobHandler, CapturePipeline, CaptureSession, WriteOrigin,
};
pub use ingest::{
    ChangeFailure, InboundChange, IngestJob, IngestJobHandler, IngestPipeline, IngestReport,
    ValidChange, validate_changes,
};
