use std::sync::Arc;

use common::{
    billing::{
        cost::CostBreakdown,
        ledger::{CreditLedger, Invocation},
    },
    error::AppError,
    storage::types::credit_account::AccountIdentity,
};
use retrieval_pipeline::SourceDocument;
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    pipeline::QueryPipeline,
    types::{
        component::{Component, Layout},
        query::{Query, QueryMetadata},
    },
};

/// Body returned to API callers for one answered question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub layout: Layout,
    pub components: Vec<Component>,
    pub cost: CostBreakdown,
    pub cached: bool,
    pub metadata: QueryMetadata,
    pub sources: Vec<SourceDocument>,
    pub credits_charged: i64,
    pub balance_remaining: i64,
}

/// Gates the pipeline behind the credit ledger.
pub struct QueryService {
    pipeline: Arc<QueryPipeline>,
    ledger: Arc<CreditLedger>,
}

impl QueryService {
    pub fn new(pipeline: Arc<QueryPipeline>, ledger: Arc<CreditLedger>) -> Self {
        Self { pipeline, ledger }
    }

    pub fn ledger(&self) -> &Arc<CreditLedger> {
        &self.ledger
    }

    /// Authorizes, answers and bills one question.
    ///
    /// Nothing is charged when authorization or the pipeline fails. A fresh answer reaches the
    /// result cache only after the charge went through, so a refused charge leaves no trace.
    #[instrument(skip_all, fields(account = %identity.account_id()))]
    pub async fn handle(
        &self,
        identity: &AccountIdentity,
        query: &Query,
    ) -> Result<QueryResponse, AppError> {
        self.ledger.authorize(identity).await?;

        let outcome = self.pipeline.answer(query).await?;

        let receipt = self
            .ledger
            .charge(
                identity,
                Invocation {
                    query: &query.text,
                    cached: outcome.cached,
                    cost: outcome.cost,
                },
            )
            .await?;

        self.pipeline.publish(query, &outcome).await;

        info!(
            cached = outcome.cached,
            credits_charged = receipt.credits_charged,
            balance = receipt.balance_remaining,
            "Query billed"
        );

        Ok(QueryResponse {
            layout: outcome.layout,
            components: outcome.components,
            cost: outcome.cost,
            cached: outcome.cached,
            metadata: outcome.metadata,
            sources: outcome.sources,
            credits_charged: receipt.credits_charged,
            balance_remaining: receipt.balance_remaining,
        })
    }
}
