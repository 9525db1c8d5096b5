use serde_json::Value;
use tracing::info;

use crate::{error::AppError, storage::db::SurrealDbClient};

const CHUNK_TABLE: &str = "text_chunk";
const CHUNK_VECTOR_INDEX: &str = "idx_embedding_text_chunk";
const HNSW_OPTIONS: &str = "DIST COSINE TYPE F32 EFC 100 M 8";

/// Plain lookup indexes, one statement each.
const LOOKUP_INDEXES: [&str; 6] = [
    "DEFINE INDEX IF NOT EXISTS idx_text_chunk_document ON TABLE text_chunk FIELDS document_id;",
    "DEFINE INDEX IF NOT EXISTS idx_credit_account_session ON TABLE credit_account FIELDS session_id;",
    "DEFINE INDEX IF NOT EXISTS idx_credit_account_user ON TABLE credit_account FIELDS user_id;",
    "DEFINE INDEX IF NOT EXISTS idx_usage_event_account ON TABLE usage_event FIELDS account_id;",
    "DEFINE INDEX IF NOT EXISTS idx_credit_transaction_account ON TABLE credit_transaction FIELDS account_id;",
    "DEFINE INDEX IF NOT EXISTS idx_cached_response_expiry ON TABLE cached_response FIELDS expires_at;",
];

enum HnswIndexState {
    Missing,
    Matches,
    Different(u64),
}

/// Idempotent: safe to call on every start, overwrites the HNSW index when the dimension changes.
pub async fn ensure_runtime_indexes(
    db: &SurrealDbClient,
    embedding_dimension: usize,
) -> Result<(), AppError> {
    for statement in LOOKUP_INDEXES {
        db.client.query(statement).await?.check()?;
    }

    let definition = match hnsw_index_state(db, embedding_dimension).await? {
        HnswIndexState::Missing | HnswIndexState::Matches => {
            hnsw_definition("IF NOT EXISTS", embedding_dimension)
        }
        HnswIndexState::Different(existing) => {
            info!(
                index = CHUNK_VECTOR_INDEX,
                existing_dimension = existing,
                target_dimension = embedding_dimension,
                "Overwriting HNSW index to match new embedding dimension"
            );
            hnsw_definition("OVERWRITE", embedding_dimension)
        }
    };

    db.client.query(definition).await?.check()?;
    Ok(())
}

fn hnsw_definition(mode: &str, dimension: usize) -> String {
    format!(
        "DEFINE INDEX {mode} {CHUNK_VECTOR_INDEX} ON TABLE {CHUNK_TABLE} \
         FIELDS embedding HNSW DIMENSION {dimension} {HNSW_OPTIONS};"
    )
}

async fn hnsw_index_state(
    db: &SurrealDbClient,
    expected_dimension: usize,
) -> Result<HnswIndexState, AppError> {
    let mut response = db
        .client
        .query(format!("INFO FOR TABLE {CHUNK_TABLE};"))
        .await?;
    let info: surrealdb::Value = response.take(0)?;
    let info_json: Value = serde_json::to_value(info)?;

    let Some(definition) = info_json
        .get("Object")
        .and_then(|o| o.get("indexes"))
        .and_then(|i| i.get("Object"))
        .and_then(|i| i.get(CHUNK_VECTOR_INDEX))
        .and_then(|details| details.get("Strand"))
        .and_then(Value::as_str)
    else {
        return Ok(HnswIndexState::Missing);
    };

    match extract_dimension(definition) {
        Some(current) if current == expected_dimension as u64 => Ok(HnswIndexState::Matches),
        Some(current) => Ok(HnswIndexState::Different(current)),
        None => Ok(HnswIndexState::Missing),
    }
}

fn extract_dimension(definition: &str) -> Option<u64> {
    definition
        .split("DIMENSION")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|token| token.trim_end_matches(';').parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn extract_dimension_parses_value() {
        let definition = "DEFINE INDEX idx_embedding_text_chunk ON TABLE text_chunk FIELDS embedding HNSW DIMENSION 1536 DIST COSINE TYPE F32 EFC 100 M 8;";
        assert_eq!(extract_dimension(definition), Some(1536));
        assert_eq!(extract_dimension("DEFINE INDEX x ON y FIELDS z"), None);
    }

    #[tokio::test]
    async fn ensure_runtime_indexes_is_idempotent() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("indexes_ns", database)
            .await
            .expect("in-memory db");

        ensure_runtime_indexes(&db, 1536)
            .await
            .expect("initial index creation");
        ensure_runtime_indexes(&db, 1536)
            .await
            .expect("second index creation");
    }

    #[tokio::test]
    async fn ensure_runtime_indexes_overwrites_dimension() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("indexes_dim", database)
            .await
            .expect("in-memory db");

        ensure_runtime_indexes(&db, 1536)
            .await
            .expect("initial index creation");
        ensure_runtime_indexes(&db, 128)
            .await
            .expect("overwritten index creation");
    }
}
