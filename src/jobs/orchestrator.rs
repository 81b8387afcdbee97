//! The job orchestrator: a fixed four-step pipeline with status reporting.
//!
//! One orchestrator run owns one job from `Pending` to a terminal state. It
//! marks the job `Processing` with the step's label before executing each
//! step, captures any step failure into the terminal `Failed` record, and
//! always removes the staged local file afterwards. The job record is the
//! sole error-reporting channel for pipeline steps; only Job Store failures
//! propagate to the caller.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::jobs::store::{JobStore, JobStoreError};
use crate::jobs::types::JobStatus;
use crate::object_store::ObjectStore;
use crate::processing::{DocumentParser, chunk_pages};
use crate::vector::{ChunkPoint, VectorIndex, compute_chunk_hash};

/// Step label for uploading the staged file to object storage.
pub const STEP_UPLOAD: &str = "Uploading to object storage";
/// Step label for parsing and chunking the document.
pub const STEP_PARSE: &str = "Parsing document";
/// Step label for embedding generation.
pub const STEP_EMBED: &str = "Generating embeddings";
/// Step label for the vector index batch write.
pub const STEP_INDEX: &str = "Writing to vector index";
/// Label recorded with the terminal `Done` state.
pub const STEP_COMPLETE: &str = "Complete";

/// Locally staged upload handed to a worker together with its job id.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    /// Identifier of the job record created by the upload handler.
    pub job_id: Uuid,
    /// Path of the staged temporary copy, owned by this run.
    pub path: PathBuf,
    /// Original filename supplied with the upload.
    pub filename: String,
}

struct StepFailure {
    step: &'static str,
    message: String,
}

/// Drives staged uploads through upload → parse → embed → index.
///
/// Collaborators are injected as trait objects; the composition root owns
/// their lifecycle and shares them across workers through `Arc`.
pub struct JobOrchestrator {
    job_store: Arc<dyn JobStore>,
    object_store: Arc<dyn ObjectStore>,
    parser: Arc<dyn DocumentParser>,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    collection: String,
    chunk_size: usize,
    chunk_overlap: usize,
    embedding_model: String,
    step_timeout: Option<Duration>,
}

impl JobOrchestrator {
    /// Wire an orchestrator from configuration and collaborators.
    pub fn new(
        config: &Config,
        job_store: Arc<dyn JobStore>,
        object_store: Arc<dyn ObjectStore>,
        parser: Arc<dyn DocumentParser>,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            job_store,
            object_store,
            parser,
            embedder,
            index,
            collection: config.qdrant_collection_name.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            embedding_model: config.embedding_model.clone(),
            step_timeout: config.step_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Run the pipeline to a terminal state for one staged upload.
    ///
    /// Step failures end up in the job record; only Job Store errors are
    /// returned. The staged file is removed after both terminal states.
    pub async fn run(&self, upload: StagedUpload) -> Result<(), JobStoreError> {
        let job_id = upload.job_id;
        let outcome = self.drive(&upload).await;

        let terminal = match outcome {
            Ok(Ok(())) => {
                tracing::info!(%job_id, "Job completed");
                self.job_store
                    .update(job_id, JobStatus::Done, Some(STEP_COMPLETE.to_string()), None)
                    .await
                    .map(|_| ())
            }
            Ok(Err(failure)) => {
                tracing::warn!(%job_id, step = failure.step, error = %failure.message, "Job failed");
                self.job_store
                    .update(
                        job_id,
                        JobStatus::Failed,
                        Some(failure.step.to_string()),
                        Some(failure.message),
                    )
                    .await
                    .map(|_| ())
            }
            Err(store_error) => Err(store_error),
        };

        remove_staged_file(&upload.path).await;
        terminal
    }

    async fn drive(
        &self,
        upload: &StagedUpload,
    ) -> Result<Result<(), StepFailure>, JobStoreError> {
        let job_id = upload.job_id;
        let object_key = format!("{job_id}/{}", upload.filename);

        self.mark_step(job_id, STEP_UPLOAD).await?;
        let stored_key = match self
            .bounded(self.object_store.upload(&upload.path, &object_key))
            .await
        {
            Ok(key) => key,
            Err(message) => return Ok(Err(StepFailure { step: STEP_UPLOAD, message })),
        };

        self.mark_step(job_id, STEP_PARSE).await?;
        let pages = match self.bounded(self.parser.parse(&upload.path)).await {
            Ok(pages) => pages,
            Err(message) => return Ok(Err(StepFailure { step: STEP_PARSE, message })),
        };
        let chunks = match chunk_pages(
            &pages,
            self.chunk_size,
            self.chunk_overlap,
            &self.embedding_model,
        ) {
            Ok(chunks) => chunks,
            Err(err) => {
                return Ok(Err(StepFailure {
                    step: STEP_PARSE,
                    message: err.to_string(),
                }));
            }
        };
        tracing::debug!(%job_id, pages = pages.len(), chunks = chunks.len(), "Document chunked");

        self.mark_step(job_id, STEP_EMBED).await?;
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = match self.bounded(self.embedder.embed(texts)).await {
            Ok(vectors) => vectors,
            Err(message) => return Ok(Err(StepFailure { step: STEP_EMBED, message })),
        };

        self.mark_step(job_id, STEP_INDEX).await?;
        let points: Vec<ChunkPoint> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkPoint {
                chunk_hash: compute_chunk_hash(&chunk.text),
                text: chunk.text,
                page_label: chunk.page_label,
                source: stored_key.clone(),
                job_id: job_id.to_string(),
                vector,
            })
            .collect();
        match self
            .bounded(self.index.upsert(&self.collection, points))
            .await
        {
            Ok(summary) => {
                tracing::debug!(%job_id, written = summary.written, "Chunks persisted");
                Ok(Ok(()))
            }
            Err(message) => Ok(Err(StepFailure { step: STEP_INDEX, message })),
        }
    }

    async fn mark_step(&self, job_id: Uuid, step: &str) -> Result<(), JobStoreError> {
        let found = self
            .job_store
            .update(job_id, JobStatus::Processing, Some(step.to_string()), None)
            .await?;
        if !found {
            // Record not yet visible; the run proceeds and later updates retry.
            tracing::debug!(%job_id, step, "Job record not found during step update");
        }
        Ok(())
    }

    /// Execute a step future, converting errors (and the optional configured
    /// timeout) into the failure message recorded on the job.
    async fn bounded<T, E>(
        &self,
        step: impl Future<Output = Result<T, E>>,
    ) -> Result<T, String>
    where
        E: std::fmt::Display,
    {
        match self.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, step).await {
                Ok(result) => result.map_err(|err| err.to_string()),
                Err(_) => Err(format!("step timed out after {}s", limit.as_secs())),
            },
            None => step.await.map_err(|err| err.to_string()),
        }
    }
}

/// Best-effort removal of the staged temporary file.
///
/// A file that is already gone is not an error; anything else is logged and
/// does not change the job's terminal status.
async fn remove_staged_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to remove staged file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::Job;
    use crate::object_store::{ObjectKey, ObjectStoreError};
    use crate::processing::{DocumentPage, ParseError};
    use crate::vector::{ScoredChunk, UpsertSummary, VectorIndexError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Event {
        job_id: Uuid,
        status: JobStatus,
        step: Option<String>,
        error: Option<String>,
    }

    /// Job store wrapper recording every update in arrival order.
    struct RecordingStore {
        inner: InMemoryJobStore,
        events: Mutex<Vec<Event>>,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryJobStore::new(),
                events: Mutex::new(Vec::new()),
            }
        }

        fn events_for(&self, job_id: Uuid) -> Vec<Event> {
            self.events
                .lock()
                .expect("events lock")
                .iter()
                .filter(|event| event.job_id == job_id)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl JobStore for RecordingStore {
        async fn create(
            &self,
            job_id: Uuid,
            filename: &str,
            owner: Option<String>,
        ) -> Result<(), JobStoreError> {
            self.inner.create(job_id, filename, owner).await
        }

        async fn update(
            &self,
            job_id: Uuid,
            status: JobStatus,
            step: Option<String>,
            error: Option<String>,
        ) -> Result<bool, JobStoreError> {
            self.events.lock().expect("events lock").push(Event {
                job_id,
                status,
                step: step.clone(),
                error: error.clone(),
            });
            self.inner.update(job_id, status, step, error).await
        }

        async fn get(&self, job_id: Uuid) -> Result<Option<Job>, JobStoreError> {
            self.inner.get(job_id).await
        }
    }

    struct StubObjectStore {
        fail: bool,
    }

    #[async_trait]
    impl ObjectStore for StubObjectStore {
        async fn upload(&self, _path: &Path, key: &str) -> Result<ObjectKey, ObjectStoreError> {
            if self.fail {
                Err(ObjectStoreError::InvalidUrl("gateway unreachable".into()))
            } else {
                Ok(key.to_string())
            }
        }
    }

    struct StubParser {
        fail: bool,
        pages: usize,
    }

    #[async_trait]
    impl DocumentParser for StubParser {
        async fn parse(&self, _path: &Path) -> Result<Vec<DocumentPage>, ParseError> {
            if self.fail {
                return Err(ParseError::Malformed("broken xref table".into()));
            }
            Ok((1..=self.pages)
                .map(|number| DocumentPage {
                    page_label: number.to_string(),
                    text: format!("page {number} body text"),
                })
                .collect())
        }
    }

    struct StubEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if self.fail {
                return Err(EmbeddingError::CountMismatch {
                    requested: texts.len(),
                    returned: 0,
                });
            }
            Ok(texts.iter().map(|_| vec![0.5, 0.5]).collect())
        }
    }

    #[derive(Default)]
    struct StubIndex {
        fail: bool,
        points: Mutex<Vec<ChunkPoint>>,
    }

    #[async_trait]
    impl VectorIndex for StubIndex {
        async fn ensure_collection(
            &self,
            _collection: &str,
            _vector_size: u64,
        ) -> Result<(), VectorIndexError> {
            Ok(())
        }

        async fn upsert(
            &self,
            _collection: &str,
            points: Vec<ChunkPoint>,
        ) -> Result<UpsertSummary, VectorIndexError> {
            if self.fail {
                return Err(VectorIndexError::InvalidUrl("index offline".into()));
            }
            let written = points.len();
            self.points.lock().expect("points lock").extend(points);
            Ok(UpsertSummary { written })
        }

        async fn search(
            &self,
            _collection: &str,
            _vector: Vec<f32>,
            _limit: usize,
        ) -> Result<Vec<ScoredChunk>, VectorIndexError> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        store: Arc<RecordingStore>,
        index: Arc<StubIndex>,
        orchestrator: JobOrchestrator,
    }

    fn fixture(fail_step: Option<usize>) -> Fixture {
        let store = Arc::new(RecordingStore::new());
        let index = Arc::new(StubIndex {
            fail: fail_step == Some(4),
            ..Default::default()
        });
        let orchestrator = JobOrchestrator {
            job_store: store.clone(),
            object_store: Arc::new(StubObjectStore {
                fail: fail_step == Some(1),
            }),
            parser: Arc::new(StubParser {
                fail: fail_step == Some(2),
                pages: 3,
            }),
            embedder: Arc::new(StubEmbedder {
                fail: fail_step == Some(3),
            }),
            index: index.clone(),
            collection: "documents".into(),
            chunk_size: 1000,
            chunk_overlap: 400,
            embedding_model: "text-embedding-3-large".into(),
            step_timeout: None,
        };
        Fixture {
            store,
            index,
            orchestrator,
        }
    }

    async fn staged_upload(store: &RecordingStore) -> StagedUpload {
        let job_id = Uuid::new_v4();
        store
            .create(job_id, "report.pdf", None)
            .await
            .expect("create job");
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let (_, path) = file.keep().expect("persist temp file");
        tokio::fs::write(&path, b"staged bytes").await.expect("write");
        StagedUpload {
            job_id,
            path,
            filename: "report.pdf".into(),
        }
    }

    fn processing_labels(events: &[Event]) -> Vec<&str> {
        events
            .iter()
            .filter(|event| event.status == JobStatus::Processing)
            .filter_map(|event| event.step.as_deref())
            .collect()
    }

    #[tokio::test]
    async fn successful_run_walks_all_steps_in_order() {
        let fixture = fixture(None);
        let upload = staged_upload(&fixture.store).await;
        let job_id = upload.job_id;
        let path = upload.path.clone();

        fixture.orchestrator.run(upload).await.expect("run succeeds");

        let events = fixture.store.events_for(job_id);
        assert_eq!(
            processing_labels(&events),
            vec![STEP_UPLOAD, STEP_PARSE, STEP_EMBED, STEP_INDEX]
        );
        let last = events.last().expect("terminal event");
        assert_eq!(last.status, JobStatus::Done);
        assert_eq!(last.step.as_deref(), Some(STEP_COMPLETE));
        assert!(last.error.is_none());

        let job = fixture
            .store
            .get(job_id)
            .await
            .expect("get")
            .expect("job exists");
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.error.is_none());

        let points = fixture.index.points.lock().expect("points lock");
        assert!(points.len() >= 3);
        assert!(points.iter().all(|point| point.job_id == job_id.to_string()));
        assert!(
            points
                .iter()
                .all(|point| point.source == format!("{job_id}/report.pdf"))
        );

        assert!(!path.exists(), "staged file removed after Done");
    }

    #[tokio::test]
    async fn failure_in_each_step_stops_the_pipeline() {
        let expected_labels = [STEP_UPLOAD, STEP_PARSE, STEP_EMBED, STEP_INDEX];
        for failing in 1..=4usize {
            let fixture = fixture(Some(failing));
            let upload = staged_upload(&fixture.store).await;
            let job_id = upload.job_id;
            let path = upload.path.clone();

            fixture
                .orchestrator
                .run(upload)
                .await
                .expect("store updates succeed");

            let events = fixture.store.events_for(job_id);
            assert_eq!(
                processing_labels(&events),
                &expected_labels[..failing],
                "exactly the first {failing} steps are observable"
            );

            let last = events.last().expect("terminal event");
            assert_eq!(last.status, JobStatus::Failed);
            assert_eq!(last.step.as_deref(), Some(expected_labels[failing - 1]));
            assert!(
                last.error.as_deref().is_some_and(|msg| !msg.is_empty()),
                "failure carries a message"
            );

            let job = fixture
                .store
                .get(job_id)
                .await
                .expect("get")
                .expect("job exists");
            assert_eq!(job.status, JobStatus::Failed);
            assert!(job.error.is_some());

            assert!(!path.exists(), "staged file removed after Failed");
        }
    }

    #[tokio::test]
    async fn job_never_jumps_from_pending_to_terminal() {
        let fixture = fixture(Some(1));
        let upload = staged_upload(&fixture.store).await;
        let job_id = upload.job_id;

        fixture.orchestrator.run(upload).await.expect("run");

        let events = fixture.store.events_for(job_id);
        assert_eq!(events.first().map(|event| event.status), Some(JobStatus::Processing));
    }

    #[tokio::test]
    async fn missing_record_is_a_benign_race() {
        let fixture = fixture(None);
        // No create: the record is not visible to the store yet.
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let (_, path) = file.keep().expect("persist temp file");
        tokio::fs::write(&path, b"bytes").await.expect("write");
        let upload = StagedUpload {
            job_id: Uuid::new_v4(),
            path: path.clone(),
            filename: "ghost.pdf".into(),
        };

        fixture.orchestrator.run(upload).await.expect("run completes");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn concurrent_jobs_never_cross_write() {
        let fixture = fixture(None);
        let first = staged_upload(&fixture.store).await;
        let second = staged_upload(&fixture.store).await;
        let first_id = first.job_id;
        let second_id = second.job_id;

        let orchestrator = Arc::new(fixture.orchestrator);
        let left = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run(first).await }
        });
        let right = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run(second).await }
        });
        left.await.expect("join").expect("first run");
        right.await.expect("join").expect("second run");

        for job_id in [first_id, second_id] {
            let events = fixture.store.events_for(job_id);
            assert_eq!(
                processing_labels(&events),
                vec![STEP_UPLOAD, STEP_PARSE, STEP_EMBED, STEP_INDEX],
                "per-job history is internally consistent"
            );
            assert_eq!(
                events.last().map(|event| event.status),
                Some(JobStatus::Done)
            );
        }
    }

    #[tokio::test]
    async fn configured_timeout_fails_the_step() {
        struct SlowObjectStore;

        #[async_trait]
        impl ObjectStore for SlowObjectStore {
            async fn upload(
                &self,
                _path: &Path,
                key: &str,
            ) -> Result<ObjectKey, ObjectStoreError> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(key.to_string())
            }
        }

        let store = Arc::new(RecordingStore::new());
        let orchestrator = JobOrchestrator {
            job_store: store.clone(),
            object_store: Arc::new(SlowObjectStore),
            parser: Arc::new(StubParser { fail: false, pages: 1 }),
            embedder: Arc::new(StubEmbedder { fail: false }),
            index: Arc::new(StubIndex::default()),
            collection: "documents".into(),
            chunk_size: 1000,
            chunk_overlap: 400,
            embedding_model: "text-embedding-3-large".into(),
            step_timeout: Some(Duration::from_millis(20)),
        };

        let upload = staged_upload(&store).await;
        let job_id = upload.job_id;
        orchestrator.run(upload).await.expect("run");

        let job = store.get(job_id).await.expect("get").expect("job exists");
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().is_some_and(|msg| msg.contains("timed out")));
        assert_eq!(job.step.as_deref(), Some(STEP_UPLOAD));
    }
}
