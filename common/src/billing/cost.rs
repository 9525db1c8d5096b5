use serde::{Deserialize, Serialize};

// Rates in cents (1 credit) per 1K units
pub const EMBEDDING_RATE_PER_1K: f64 = 0.01;
pub const LLM_INPUT_RATE_PER_1K: f64 = 1.0;
pub const LLM_OUTPUT_RATE_PER_1K: f64 = 3.0;
/// One cent per hundred searches.
pub const VECTOR_QUERY_RATE_PER_1K: f64 = 10.0;

pub const DEFAULT_MARGIN: f64 = 0.4;

/// Raw resource counts gathered while answering one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub embedding_tokens: u64,
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    pub vector_queries: u64,
}

impl ResourceUsage {
    pub fn merge(&mut self, other: ResourceUsage) {
        self.embedding_tokens = self.embedding_tokens.saturating_add(other.embedding_tokens);
        self.llm_input_tokens = self.llm_input_tokens.saturating_add(other.llm_input_tokens);
        self.llm_output_tokens = self.llm_output_tokens.saturating_add(other.llm_output_tokens);
        self.vector_queries = self.vector_queries.saturating_add(other.vector_queries);
    }
}

/// Priced usage. Every amount is in cents and one credit equals one cent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub embedding_tokens: u64,
    pub embedding_cost_cents: i64,
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    pub llm_cost_cents: i64,
    pub vector_queries: u64,
    pub vector_cost_cents: i64,
    pub margin_cents: i64,
    pub total_cents: i64,
    pub total_credits: i64,
}

impl CostBreakdown {
    pub const fn zero() -> Self {
        Self {
            embedding_tokens: 0,
            embedding_cost_cents: 0,
            llm_input_tokens: 0,
            llm_output_tokens: 0,
            llm_cost_cents: 0,
            vector_queries: 0,
            vector_cost_cents: 0,
            margin_cents: 0,
            total_cents: 0,
            total_credits: 0,
        }
    }

    /// Prices `usage` and adds `margin` (a fraction) on top.
    ///
    /// Each category and the margin are rounded half-to-even, with a floor of one cent whenever
    /// the category's count is non-zero. LLM input and output are priced as one category. The
    /// total is rounded from the unrounded sum without a floor, so it can differ from the sum of
    /// the categories and tiny usage can total zero.
    pub fn calculate(usage: ResourceUsage, margin: f64) -> Self {
        let embedding_f = per_thousand(usage.embedding_tokens, EMBEDDING_RATE_PER_1K);
        let llm_f = per_thousand(usage.llm_input_tokens, LLM_INPUT_RATE_PER_1K)
            + per_thousand(usage.llm_output_tokens, LLM_OUTPUT_RATE_PER_1K);
        let vector_f = per_thousand(usage.vector_queries, VECTOR_QUERY_RATE_PER_1K);

        let subtotal_f = embedding_f + llm_f + vector_f;
        let margin_f = subtotal_f * margin;
        let total_f = subtotal_f + margin_f;

        let llm_count = usage
            .llm_input_tokens
            .saturating_add(usage.llm_output_tokens);
        let margin_cents = if margin > 0.0 && subtotal_f > 0.0 {
            round_cents(margin_f).max(1)
        } else {
            0
        };
        let total = if total_f > 0.0 {
            round_cents(total_f)
        } else {
            0
        };

        Self {
            embedding_tokens: usage.embedding_tokens,
            embedding_cost_cents: category_cents(usage.embedding_tokens, embedding_f),
            llm_input_tokens: usage.llm_input_tokens,
            llm_output_tokens: usage.llm_output_tokens,
            llm_cost_cents: category_cents(llm_count, llm_f),
            vector_queries: usage.vector_queries,
            vector_cost_cents: category_cents(usage.vector_queries, vector_f),
            margin_cents,
            total_cents: total,
            total_credits: total,
        }
    }

    pub const fn is_zero(&self) -> bool {
        self.total_credits == 0
            && self.embedding_tokens == 0
            && self.llm_input_tokens == 0
            && self.llm_output_tokens == 0
            && self.vector_queries == 0
    }
}

fn per_thousand(count: u64, rate: f64) -> f64 {
    (count as f64 / 1000.0) * rate
}

fn round_cents(value: f64) -> i64 {
    value.round_ties_even() as i64
}

fn category_cents(count: u64, cost: f64) -> i64 {
    if count > 0 {
        round_cents(cost).max(1)
    } else {
        0
    }
}
