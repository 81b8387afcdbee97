use ragline::{
    api::{self, AppState},
    auth::UserStore,
    chat::{ConversationStore, OpenAiChatClient, QueryAnswerer},
    config::Config,
    dispatch::Dispatcher,
    embedding::OpenAiEmbeddingClient,
    jobs::{InMemoryJobStore, JobOrchestrator},
    logging,
    object_store::HttpObjectStore,
    vector::{QdrantIndex, VectorIndex},
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    logging::init_tracing();
    let config = Config::load().expect("Failed to load config from environment");

    let job_store = Arc::new(InMemoryJobStore::new());
    let user_store = Arc::new(UserStore::new());
    let object_store =
        Arc::new(HttpObjectStore::new(&config).expect("Failed to build object store client"));
    let embedder =
        Arc::new(OpenAiEmbeddingClient::new(&config).expect("Failed to build embedding client"));
    let index = Arc::new(QdrantIndex::new(&config).expect("Failed to build Qdrant client"));
    let chat = Arc::new(OpenAiChatClient::new(&config).expect("Failed to build chat client"));

    index
        .ensure_collection(
            &config.qdrant_collection_name,
            config.embedding_dimension as u64,
        )
        .await
        .expect("Failed to ensure Qdrant collection exists");
    tracing::debug!(collection = %config.qdrant_collection_name, "Primary collection ready");

    let orchestrator = Arc::new(JobOrchestrator::new(
        &config,
        job_store.clone(),
        object_store,
        Arc::new(ragline::processing::PdfParser::new()),
        embedder.clone(),
        index.clone(),
    ));
    let answerer = Arc::new(QueryAnswerer::new(
        &config,
        embedder,
        index,
        chat,
        Arc::new(ConversationStore::new()),
    ));
    let dispatcher = Dispatcher::start(&config, orchestrator, answerer);

    let app = api::create_router(Arc::new(AppState {
        dispatcher,
        job_store,
        user_store,
    }));

    let (listener, port) = bind_listener(&config)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.unwrap();
}

async fn bind_listener(config: &Config) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4700..=4799;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4700-4799",
    ))
}
