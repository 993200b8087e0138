use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::Sse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sage_core::agent;
use sage_core::config::Config;
use sage_core::embedding::EmbeddingClient;
use sage_core::error::AppError;
use sage_core::llm::local::LocalProvider;
use sage_core::llm::remote::RemoteProvider;
use sage_core::memory::ChatMemoryWindow;
use sage_core::models::{ConversationKind, Message, Role};
use sage_core::router::{self, ModelRegistry};
use sage_core::store::ConversationStore;
use sage_core::stream::{self, StreamEvent};
use sage_core::tools::{self, RecordSink, RetrievalSink, ToolContext, ToolRegistry};
use sage_core::vector::VectorIndexClient;

const SYSTEM_PREAMBLE: &str = "You are a helpful assistant with access to a knowledge base \
    search tool, a confined filesystem, and a set of financial calculation tools. Prefer \
    calling a tool over guessing when a question depends on facts you do not already know.";

mod diesel_migrations_embed {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations};
    pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("../../migrations");
}

struct AppState {
    config: Config,
    store: ConversationStore,
    models: ModelRegistry,
    tool_registry: ToolRegistry,
    embedding_client: Arc<EmbeddingClient>,
    vector_client: Arc<VectorIndexClient>,
}

/// The external-collaborator session: `currentUserId(session) -> id|null`
/// (spec.md §6), implemented here as a required `X-User-Id` header
/// (SPEC_FULL.md §11.5). Absence yields 401 before any other processing.
struct AuthenticatedUser(String);

impl AuthenticatedUser {
    fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(|s| AuthenticatedUser(s.to_string()))
            .ok_or(AppError::Unauthenticated)
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct StreamRequest {
    message: String,
    #[serde(rename = "conversationId")]
    conversation_id: Option<String>,
}

async fn agent_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<StreamRequest>,
) -> Result<Sse<impl futures::stream::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>, AppError> {
    let user = AuthenticatedUser::from_headers(&headers)?;

    if body.message.trim().is_empty() {
        return Err(AppError::InvalidInput("message must not be empty".to_string()));
    }

    let conversation_id = body
        .conversation_id
        .unwrap_or_else(|| sage_core::models::new_conversation_id(ConversationKind::Agent));

    let (producer, receiver) = stream::channel();

    tokio::spawn(run_turn(
        state,
        user.0,
        conversation_id,
        body.message,
        producer,
    ));

    Ok(stream::into_sse_response(receiver))
}

async fn run_turn(
    state: Arc<AppState>,
    user_id: String,
    conversation_id: String,
    message: String,
    producer: sage_core::stream::EventProducer,
) {
    let (model, decision) = router::route(&state.config, &state.models, &message);
    info!(conversation_id = %conversation_id, reason = %decision.reason, "routed turn");

    let user_row = Message {
        id: uuid::Uuid::new_v4(),
        conversation_id: conversation_id.clone(),
        user_id: Some(user_id.clone()),
        role: Role::User.as_str().to_string(),
        content: message.clone(),
        sources: None,
        created_at: chrono::Utc::now(),
    };
    if let Err(e) = state.store.append(&user_row) {
        error!(conversation_id = %conversation_id, error = %e, "failed to persist user message");
        producer
            .emit_error(AppError::StoreError(e.to_string()))
            .await;
        return;
    }

    let mut memory = match ChatMemoryWindow::load(
        &state.store,
        &conversation_id,
        state.config.context_window,
    ) {
        Ok(window) => window.with_system_preamble(SYSTEM_PREAMBLE),
        Err(e) => {
            error!(conversation_id = %conversation_id, error = %e, "failed to load memory window");
            producer
                .emit_error(AppError::StoreError(e.to_string()))
                .await;
            return;
        }
    };

    let ctx = ToolContext {
        allowed_directory: std::path::PathBuf::from(&state.config.allowed_directory),
        conversation_id: conversation_id.clone(),
        embedding_client: state.embedding_client.clone(),
        vector_client: state.vector_client.clone(),
        vector_max_results: state.config.vector_max_results,
        vector_min_score: state.config.vector_min_score,
        record_sink: RecordSink::new(),
        retrieval_sink: RetrievalSink::new(),
    };

    let outcome = agent::run(
        model,
        &state.tool_registry,
        &mut memory,
        &message,
        &ctx,
        state.config.agent_step_cap,
    )
    .await;

    match outcome {
        Ok(outcome) => {
            producer.emit_final_text(&outcome.text).await;

            let assistant_row = Message {
                id: uuid::Uuid::new_v4(),
                conversation_id: conversation_id.clone(),
                user_id: Some(user_id),
                role: Role::Assistant.as_str().to_string(),
                content: outcome.text.clone(),
                sources: outcome.sources,
                created_at: chrono::Utc::now(),
            };
            if let Err(e) = state.store.append_assistant_with_fallback(&assistant_row) {
                error!(conversation_id = %conversation_id, error = %e, "assistant message lost after retry");
                producer
                    .emit_error(AppError::StoreError(e.to_string()))
                    .await;
                return;
            }

            producer.emit_history(outcome.tool_calls).await;
            producer.emit_done(&conversation_id).await;
        }
        Err(app_error) => {
            error!(conversation_id = %conversation_id, error = %app_error, "agent loop aborted");
            producer.emit_error(app_error).await;
        }
    }
}

async fn agent_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    AuthenticatedUser::from_headers(&headers)?;
    let history = state
        .store
        .history(&conversation_id)
        .map_err(|e| AppError::StoreError(e.to_string()))?;
    Ok(Json(history))
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, AppError> {
    let user = AuthenticatedUser::from_headers(&headers)?;
    let ids = state
        .store
        .conversations_for(&user.0, ConversationKind::Agent.prefix())
        .map_err(|e| AppError::StoreError(e.to_string()))?;
    Ok(Json(ids))
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<StatusCode, AppError> {
    AuthenticatedUser::from_headers(&headers)?;
    state
        .store
        .delete(&conversation_id)
        .map_err(|e| AppError::StoreError(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sage_core=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    info!("configuration loaded");

    {
        use diesel::prelude::*;
        use diesel_migrations::MigrationHarness;

        let mut conn = diesel::PgConnection::establish(&config.database_url)?;
        conn.run_pending_migrations(diesel_migrations_embed::MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("migration failed: {e}"))?;
        info!("database migrations applied");
    }

    let store = ConversationStore::new(&config.database_url)?;
    let vector_client = Arc::new(VectorIndexClient::new(&config.database_url)?);
    let embedding_client = Arc::new(EmbeddingClient::new(
        &config.embedding_api_url,
        config.embedding_api_key.as_deref(),
        &config.embedding_model,
    ));

    let models = ModelRegistry {
        local: Arc::new(LocalProvider::new(
            &config.local_model.base_url,
            &config.local_model.model_name,
            config.local_model.timeout_secs,
        )),
        remote: Arc::new(RemoteProvider::new(
            &config.remote_model.base_url,
            config.remote_model.api_key.as_deref(),
            &config.remote_model.model_name,
            config.remote_model.timeout_secs,
        )),
    };

    let tool_registry = tools::build_default_registry(&config);

    let state = Arc::new(AppState {
        config,
        store,
        models,
        tool_registry,
        embedding_client,
        vector_client,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/agent/stream", post(agent_stream))
        .route("/agent/history/{conversationId}", get(agent_history))
        .route("/agent/conversations", get(list_conversations))
        .route(
            "/agent/conversations/{conversationId}",
            delete(delete_conversation),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state.clone());

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", state.config.http_host, state.config.http_port))
            .await?;
    info!("sage listening on {}:{}", state.config.http_host, state.config.http_port);
    axum::serve(listener, app).await?;

    Ok(())
}
