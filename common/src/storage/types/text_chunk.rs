use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use uuid::Uuid;

/// Provenance shared by every chunk of one source document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMeta {
    pub document_id: String,
    pub source_name: String,
    #[serde(default)]
    pub source_url: Option<String>,
    /// ISO `YYYY-MM-DD`, compared lexically by date filters.
    #[serde(default)]
    pub source_date: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

stored_object!(TextChunk, "text_chunk", {
    document_id: String,
    position: u32,
    text: String,
    embedding: Vec<f32>,
    source_name: String,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    source_date: Option<String>,
    #[serde(default)]
    document_type: Option<String>,
    #[serde(default)]
    member_ids: Vec<String>
});

impl TextChunk {
    pub fn new(meta: &DocumentMeta, position: u32, text: String, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id: meta.document_id.clone(),
            position,
            text,
            embedding,
            source_name: meta.source_name.clone(),
            source_url: meta.source_url.clone(),
            source_date: meta.source_date.clone(),
            document_type: meta.document_type.clone(),
            member_ids: meta.member_ids.clone(),
        }
    }

    pub async fn delete_by_document_id(
        document_id: &str,
        db_client: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db_client
            .client
            .query("DELETE type::table($table) WHERE document_id = $document_id")
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_owned()))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn find_by_document_id(
        document_id: &str,
        db_client: &SurrealDbClient,
    ) -> Result<Vec<TextChunk>, AppError> {
        let chunks: Vec<TextChunk> = db_client
            .client
            .query("SELECT * FROM type::table($table) WHERE document_id = $document_id ORDER BY position ASC")
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_owned()))
            .await?
            .take(0)?;

        Ok(chunks)
    }
}
