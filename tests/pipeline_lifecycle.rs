//! End-to-end lifecycle checks for the ingestion pipeline: a real PDF walked
//! through the orchestrator with stub collaborators, forced step failures,
//! staged-file cleanup, and the dispatcher worker path.

use async_trait::async_trait;
use lopdf::{Document, Object, Stream, dictionary};
use ragline::config::Config;
use ragline::dispatch::Dispatcher;
use ragline::embedding::{EmbeddingClient, EmbeddingError};
use ragline::jobs::{
    InMemoryJobStore, JobOrchestrator, JobStatus, JobStore, STEP_UPLOAD, StagedUpload,
};
use ragline::object_store::{ObjectKey, ObjectStore, ObjectStoreError};
use ragline::processing::PdfParser;
use ragline::vector::{ChunkPoint, ScoredChunk, UpsertSummary, VectorIndex, VectorIndexError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

fn test_config() -> Config {
    Config {
        object_store_url: "http://127.0.0.1:9000".into(),
        object_store_bucket: "uploads".into(),
        object_store_api_token: None,
        qdrant_url: "http://127.0.0.1:6333".into(),
        qdrant_collection_name: "documents".into(),
        qdrant_api_key: None,
        openai_api_key: "test-key".into(),
        openai_api_url: None,
        embedding_model: "text-embedding-3-large".into(),
        embedding_dimension: 3,
        chat_model: "gpt-4.1".into(),
        chunk_size: 1000,
        chunk_overlap: 400,
        worker_count: 2,
        queue_capacity: 8,
        step_timeout_secs: None,
        search_top_k: 4,
        server_port: None,
    }
}

/// Build a minimal single-font PDF with one page per entry in `page_texts`.
fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in page_texts {
        let content = format!("BT /F1 12 Tf 50 700 Td ({text}) Tj ET");
        let content_id =
            doc.add_object(Object::Stream(Stream::new(dictionary! {}, content.into_bytes())));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize test pdf");
    bytes
}

fn stage_pdf(page_texts: &[&str]) -> PathBuf {
    let file = tempfile::NamedTempFile::with_suffix(".pdf").expect("temp file");
    let (_, path) = file.keep().expect("persist temp file");
    std::fs::write(&path, build_pdf(page_texts)).expect("write pdf");
    path
}

struct OkObjectStore;

#[async_trait]
impl ObjectStore for OkObjectStore {
    async fn upload(&self, _path: &Path, key: &str) -> Result<ObjectKey, ObjectStoreError> {
        Ok(key.to_string())
    }
}

struct FailingObjectStore;

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn upload(&self, _path: &Path, _key: &str) -> Result<ObjectKey, ObjectStoreError> {
        Err(ObjectStoreError::InvalidUrl(
            "storage gateway unreachable".into(),
        ))
    }
}

struct CountingEmbedder;

#[async_trait]
impl EmbeddingClient for CountingEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| vec![text.len() as f32, 0.0, 1.0])
            .collect())
    }
}

#[derive(Default)]
struct CapturingIndex {
    points: Mutex<Vec<ChunkPoint>>,
}

#[async_trait]
impl VectorIndex for CapturingIndex {
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

fn orchestrator_with(
    store: Arc<InMemoryJobStore>,
    object_store: Arc<dyn ObjectStore>,
    index: Arc<CapturingIndex>,
) -> JobOrchestrator {
    JobOrchestrator::new(
        &test_config(),
        store,
        object_store,
        Arc::new(PdfParser::new()),
        Arc::new(CountingEmbedder),
        index,
    )
}

#[tokio::test]
async fn three_page_pdf_ingests_to_done() {
    let store = Arc::new(InMemoryJobStore::new());
    let index = Arc::new(CapturingIndex::default());
    let orchestrator = orchestrator_with(store.clone(), Arc::new(OkObjectStore), index.clone());

    let job_id = Uuid::new_v4();
    store
        .create(job_id, "paper.pdf", Some("owner-1".into()))
        .await
        .expect("create");
    let path = stage_pdf(&[
        "first page body text",
        "second page body text",
        "third page body text",
    ]);

    orchestrator
        .run(StagedUpload {
            job_id,
            path: path.clone(),
            filename: "paper.pdf".into(),
        })
        .await
        .expect("run succeeds");

    let job = store.get(job_id).await.expect("get").expect("job exists");
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.error.is_none());

    let points = index.points.lock().expect("points lock");
    assert!(points.len() >= 3, "at least one chunk per page persisted");
    assert!(points.iter().all(|point| point.job_id == job_id.to_string()));
    assert!(points.iter().all(|point| point.vector.len() == 3));
    let labels: Vec<&str> = points.iter().map(|point| point.page_label.as_str()).collect();
    for label in ["1", "2", "3"] {
        assert!(labels.contains(&label), "page {label} contributed a chunk");
    }

    assert!(!path.exists(), "staged file removed after Done");
}

#[tokio::test]
async fn failing_object_stage_marks_job_failed_with_cause() {
    let store = Arc::new(InMemoryJobStore::new());
    let index = Arc::new(CapturingIndex::default());
    let orchestrator =
        orchestrator_with(store.clone(), Arc::new(FailingObjectStore), index.clone());

    let job_id = Uuid::new_v4();
    store.create(job_id, "paper.pdf", None).await.expect("create");
    let path = stage_pdf(&["only page"]);

    orchestrator
        .run(StagedUpload {
            job_id,
            path: path.clone(),
            filename: "paper.pdf".into(),
        })
        .await
        .expect("store updates succeed");

    let job = store.get(job_id).await.expect("get").expect("job exists");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.step.as_deref(), Some(STEP_UPLOAD));
    assert!(
        job.error
            .as_deref()
            .is_some_and(|msg| msg.contains("storage gateway unreachable")),
        "error message carries the underlying cause"
    );
    assert!(
        index.points.lock().expect("points lock").is_empty(),
        "nothing persisted after an aborted job"
    );
    assert!(!path.exists(), "staged file removed after Failed");
}

#[tokio::test]
async fn dispatcher_drives_queued_uploads_to_done() {
    let config = test_config();
    let store = Arc::new(InMemoryJobStore::new());
    let index = Arc::new(CapturingIndex::default());
    let orchestrator = Arc::new(orchestrator_with(
        store.clone(),
        Arc::new(OkObjectStore),
        index.clone(),
    ));
    let answerer = Arc::new(ragline::chat::QueryAnswerer::new(
        &config,
        Arc::new(CountingEmbedder),
        index.clone(),
        Arc::new(NoopChat),
        Arc::new(ragline::chat::ConversationStore::new()),
    ));
    let dispatcher = Dispatcher::start(&config, orchestrator, answerer);

    let mut job_ids = Vec::new();
    for name in ["a.pdf", "b.pdf"] {
        let job_id = Uuid::new_v4();
        store.create(job_id, name, None).await.expect("create");
        dispatcher
            .submit_ingest(StagedUpload {
                job_id,
                path: stage_pdf(&["queued document page"]),
                filename: name.into(),
            })
            .expect("enqueue");
        job_ids.push(job_id);
    }

    for job_id in job_ids {
        let mut status = None;
        for _ in 0..200 {
            let job = store.get(job_id).await.expect("get").expect("job exists");
            if job.status.is_terminal() {
                status = Some(job.status);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, Some(JobStatus::Done));
    }
}

struct NoopChat;

#[async_trait]
impl ragline::chat::ChatClient for NoopChat {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, ragline::chat::ChatError> {
        Ok("ok".into())
    }
}

#[tokio::test]
async fn store_contract_holds_end_to_end() {
    let store = InMemoryJobStore::new();
    let job_id = Uuid::new_v4();

    store
        .create(job_id, "contract.pdf", None)
        .await
        .expect("create");
    let job = store.get(job_id).await.expect("get").expect("job exists");
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.step.is_none());
    assert!(job.error.is_none());

    let err = store
        .create(job_id, "other.pdf", None)
        .await
        .expect_err("duplicate rejected");
    assert!(err.to_string().contains("already exists"));
    let job = store.get(job_id).await.expect("get").expect("job exists");
    assert_eq!(job.filename, "contract.pdf");

    let missing = Uuid::new_v4();
    let found = store
        .update(missing, JobStatus::Done, None, None)
        .await
        .expect("update call succeeds");
    assert!(!found);
    assert!(store.get(missing).await.expect("get").is_none());
}
