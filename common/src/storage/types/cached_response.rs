use crate::stored_object;

// The payload is kept as JSON text so arbitrary response shapes round-trip unchanged.
stored_object!(CachedResponse, "cached_response", {
    payload: String,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime")]
    expires_at: DateTime<Utc>
});

impl CachedResponse {
    pub fn new(key: &str, payload: String, expires_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: record_id(key),
            created_at: now,
            updated_at: now,
            payload,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Cache keys contain `:`; the record id keeps only characters that need no escaping.
pub fn record_id(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
