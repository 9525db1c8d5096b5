use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::cached_response::{record_id, CachedResponse},
    },
};

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

/// Canonical cache key for a query and its filters.
///
/// Case and whitespace differences in the query text map to the same key.
pub fn query_fingerprint<F: Serialize>(query: &str, filters: &F) -> Result<String, AppError> {
    let normalized = query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    let filters = serde_json::to_string(filters)?;
    Ok(format!("query:{}", digest(&format!("{normalized}|{filters}"))))
}

pub fn digest(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

// Out-of-range TTLs are capped at roughly a century.
fn expiry(ttl: Duration) -> DateTime<Utc> {
    let cap = chrono::Duration::days(36_500);
    let ttl = chrono::Duration::from_std(ttl).map_or(cap, |ttl| ttl.min(cap));
    Utc::now() + ttl
}

pub struct SurrealResultCache {
    db: Arc<SurrealDbClient>,
}

impl SurrealResultCache {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResultCache for SurrealResultCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let Some(entry) = self.db.get_item::<CachedResponse>(&record_id(key)).await? else {
            return Ok(None);
        };

        if entry.is_expired(Utc::now()) {
            debug!(key, "Dropping expired cache entry");
            self.db
                .delete_item::<CachedResponse>(&entry.id)
                .await?;
            return Ok(None);
        }

        Ok(Some(entry.payload))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        self.db
            .upsert_item(CachedResponse::new(key, value, expiry(ttl)))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.db
            .delete_item::<CachedResponse>(&record_id(key))
            .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryResultCache {
    entries: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

impl InMemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultCache for InMemoryResultCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some((value, expires_at)) if *expires_at > now => return Ok(Some(value.clone())),
                Some(_) => {}
            }
        }
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expiry(ttl)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
