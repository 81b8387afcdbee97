//! Job lifecycle: records, the store contract, and the pipeline orchestrator.

pub mod orchestrator;
pub mod store;
pub mod types;

pub use orchestrator::{
    JobOrchestrator, STEP_COMPLETE, STEP_EMBED, STEP_INDEX, STEP_PARSE, STEP_UPLOAD, StagedUpload,
};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{Job, JobStatus};
