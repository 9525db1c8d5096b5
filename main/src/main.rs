use agent_pipeline::{
    AgentModels, AgentTuning, ExtractionSchemaRegistry, QueryPipeline, QueryService,
};
use api_router::{api_routes_v1, api_state::ApiState};
use async_openai::{config::OpenAIConfig, Client};
use axum::{extract::FromRef, Router};
use common::{
    billing::ledger::{CreditLedger, FreeTierPolicy},
    cache::{InMemoryResultCache, ResultCache, SurrealResultCache},
    error::AppError,
    storage::{db::SurrealDbClient, vector_index::SurrealVectorIndex},
    utils::{
        config::{get_config, AppConfig, CacheBackend},
        embedding::EmbeddingProvider,
        llm::{LanguageModel, OpenAiLanguageModel},
    },
};
use retrieval_pipeline::{indexing::ChunkIndexer, ContextRetriever, RetrievalTuning};
use std::{sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    let openai_client = Arc::new(Client::with_config(
        OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedding_provider = Arc::new(EmbeddingProvider::from_config(
        &config,
        Arc::clone(&openai_client),
    ));
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_dimension = embedding_provider.dimension(),
        "Embedding provider initialized"
    );

    let app = build_app(&config, db, embedding_provider, openai_client).await?;

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wires storage, agents, billing and routes into the HTTP application.
async fn build_app(
    config: &AppConfig,
    db: Arc<SurrealDbClient>,
    embedding_provider: Arc<EmbeddingProvider>,
    openai_client: Arc<Client<OpenAIConfig>>,
) -> Result<Router, AppError> {
    // Indexes must match the embedding dimension before anything is searched
    db.ensure_initialized(embedding_provider.dimension()).await?;

    let role_model = |model: &str| -> Arc<dyn LanguageModel> {
        Arc::new(
            OpenAiLanguageModel::new(Arc::clone(&openai_client), model)
                .with_temperature(config.agent_temperature)
                .with_timeout(Duration::from_secs(config.agent_llm_timeout_secs)),
        )
    };
    let models = AgentModels {
        planner: role_model(&config.agent_planner_model),
        extractor: role_model(&config.agent_extractor_model),
        composer: role_model(&config.agent_composer_model),
        verifier: role_model(&config.agent_verifier_model),
    };

    let cache: Arc<dyn ResultCache> = match config.cache_backend {
        CacheBackend::Surreal => Arc::new(SurrealResultCache::new(Arc::clone(&db))),
        CacheBackend::Memory => Arc::new(InMemoryResultCache::new()),
    };

    let retriever = Arc::new(ContextRetriever::new(
        Arc::clone(&embedding_provider) as _,
        Arc::new(SurrealVectorIndex::new(Arc::clone(&db))),
        RetrievalTuning::from_config(config),
    ));

    let tuning = AgentTuning::from_config(config);
    info!(
        verifier_enabled = tuning.verifier_enabled,
        extraction_concurrency = tuning.extraction_concurrency,
        cache_backend = ?config.cache_backend,
        "Agent pipeline configured"
    );
    let pipeline = QueryPipeline::with_language_models(
        models,
        Arc::new(ExtractionSchemaRegistry::standard()),
        retriever,
        cache,
        tuning,
    );

    let ledger = CreditLedger::surreal(Arc::clone(&db), FreeTierPolicy::from_config(config));
    let query_service = Arc::new(QueryService::new(Arc::new(pipeline), Arc::new(ledger)));
    let indexer = Arc::new(
        ChunkIndexer::new(Arc::clone(&db), embedding_provider)
            .with_timeout(Duration::from_secs(config.agent_provider_timeout_secs)),
    );

    let api_state = ApiState::new(db, config.clone(), query_service, indexer);

    Ok(Router::new()
        .nest("/api/v1", api_routes_v1())
        .with_state(AppState { api_state }))
}

#[derive(Clone, FromRef)]
struct AppState {
    api_state: ApiState,
}
