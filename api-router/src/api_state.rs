use std::sync::Arc;

use agent_pipeline::QueryService;
use common::{
    billing::ledger::CreditLedger, storage::db::SurrealDbClient, utils::config::AppConfig,
};
use retrieval_pipeline::indexing::ChunkIndexer;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub query_service: Arc<QueryService>,
    pub indexer: Arc<ChunkIndexer>,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        query_service: Arc<QueryService>,
        indexer: Arc<ChunkIndexer>,
    ) -> Self {
        Self {
            db,
            config,
            query_service,
            indexer,
        }
    }

    pub fn ledger(&self) -> &Arc<CreditLedger> {
        self.query_service.ledger()
    }
}
