use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{billing::cost::CostBreakdown, stored_object};

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventType {
    Query,
    Ingestion,
}

stored_object!(UsageEvent, "usage_event", {
    event_type: UsageEventType,
    account_id: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    query_hash: String,
    query_preview: String,
    cached: bool,
    cost: CostBreakdown,
    credits_charged: i64
});

impl UsageEvent {
    pub fn for_query(
        account_id: String,
        session_id: Option<String>,
        user_id: Option<String>,
        query: &str,
        cached: bool,
        cost: CostBreakdown,
        credits_charged: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            event_type: UsageEventType::Query,
            account_id,
            session_id,
            user_id,
            query_hash: hash_query(query),
            query_preview: preview(query),
            cached,
            cost,
            credits_charged: if cached { 0 } else { credits_charged },
        }
    }
}

pub fn hash_query(query: &str) -> String {
    format!("{:x}", Sha256::digest(query.as_bytes()))
}

fn preview(query: &str) -> String {
    if query.chars().count() > PREVIEW_CHARS {
        let head: String = query.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        query.to_string()
    }
}
