use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::embedding::EmbeddingBackend;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Surreal,
    Memory,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_surrealdb_address")]
    pub surrealdb_address: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_username: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_password: String,
    #[serde(default = "default_surrealdb_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_surrealdb_database")]
    pub surrealdb_database: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_planner_model")]
    pub agent_planner_model: String,
    #[serde(default = "default_extractor_model")]
    pub agent_extractor_model: String,
    #[serde(default = "default_composer_model")]
    pub agent_composer_model: String,
    #[serde(default = "default_verifier_model")]
    pub agent_verifier_model: String,
    #[serde(default = "default_true")]
    pub agent_verifier_enabled: bool,
    #[serde(default = "default_top_k")]
    pub agent_default_top_k: usize,
    #[serde(default = "default_min_chunks")]
    pub agent_min_chunks: usize,
    #[serde(default = "default_cost_margin")]
    pub agent_cost_margin: f64,
    #[serde(default = "default_temperature")]
    pub agent_temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub agent_llm_timeout_secs: u64,
    /// Bound on each embedding and vector-index call.
    #[serde(default = "default_provider_timeout_secs")]
    pub agent_provider_timeout_secs: u64,
    #[serde(default = "default_extraction_concurrency")]
    pub agent_extraction_concurrency: usize,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub cache_backend: CacheBackend,

    /// Daily free queries granted to anonymous sessions.
    #[serde(default = "default_free_queries")]
    pub anonymous_free_queries: i64,
    /// Monthly free queries granted to signed-in users.
    #[serde(default = "default_user_free_queries")]
    pub user_free_queries: i64,

    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: default_base_url(),
            surrealdb_address: default_surrealdb_address(),
            surrealdb_username: default_surrealdb_credential(),
            surrealdb_password: default_surrealdb_credential(),
            surrealdb_namespace: default_surrealdb_namespace(),
            surrealdb_database: default_surrealdb_database(),
            http_port: default_http_port(),
            agent_planner_model: default_planner_model(),
            agent_extractor_model: default_extractor_model(),
            agent_composer_model: default_composer_model(),
            agent_verifier_model: default_verifier_model(),
            agent_verifier_enabled: true,
            agent_default_top_k: default_top_k(),
            agent_min_chunks: default_min_chunks(),
            agent_cost_margin: default_cost_margin(),
            agent_temperature: default_temperature(),
            agent_llm_timeout_secs: default_llm_timeout_secs(),
            agent_provider_timeout_secs: default_provider_timeout_secs(),
            agent_extraction_concurrency: default_extraction_concurrency(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_backend: CacheBackend::default(),
            anonymous_free_queries: default_free_queries(),
            user_free_queries: default_user_free_queries(),
            embedding_backend: EmbeddingBackend::default(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_surrealdb_address() -> String {
    "mem://".to_string()
}

fn default_surrealdb_credential() -> String {
    "root".to_string()
}

fn default_surrealdb_namespace() -> String {
    "legislation".to_string()
}

fn default_surrealdb_database() -> String {
    "agent".to_string()
}

const fn default_http_port() -> u16 {
    3000
}

fn default_planner_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_extractor_model() -> String {
    "gpt-4o".to_string()
}

fn default_composer_model() -> String {
    "gpt-4o".to_string()
}

fn default_verifier_model() -> String {
    "gpt-4o-mini".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_top_k() -> usize {
    20
}

const fn default_min_chunks() -> usize {
    3
}

const fn default_cost_margin() -> f64 {
    0.4
}

const fn default_temperature() -> f32 {
    0.1
}

const fn default_llm_timeout_secs() -> u64 {
    60
}

const fn default_provider_timeout_secs() -> u64 {
    30
}

const fn default_extraction_concurrency() -> usize {
    4
}

const fn default_cache_ttl_secs() -> u64 {
    3600
}

const fn default_free_queries() -> i64 {
    10
}

const fn default_user_free_queries() -> i64 {
    100
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_embedding_dimensions() -> u32 {
    1536
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_fall_back_to_defaults() {
        let config: AppConfig = Config::builder()
            .build()
            .and_then(Config::try_deserialize)
            .expect("defaults should deserialize");

        assert_eq!(config.agent_planner_model, "gpt-4o-mini");
        assert_eq!(config.agent_extractor_model, "gpt-4o");
        assert!(config.agent_verifier_enabled);
        assert_eq!(config.agent_default_top_k, 20);
        assert_eq!(config.agent_min_chunks, 3);
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.cache_backend, CacheBackend::Surreal);
        assert_eq!(config.embedding_backend, EmbeddingBackend::OpenAI);
    }

    #[test]
    fn overrides_are_applied() {
        let config: AppConfig = Config::builder()
            .set_override("agent_verifier_enabled", false)
            .and_then(|builder| builder.set_override("agent_default_top_k", 8))
            .and_then(|builder| builder.set_override("cache_backend", "memory"))
            .and_then(|builder| builder.set_override("embedding_backend", "hashed"))
            .and_then(|builder| builder.build())
            .and_then(Config::try_deserialize)
            .expect("overrides should deserialize");

        assert!(!config.agent_verifier_enabled);
        assert_eq!(config.agent_default_top_k, 8);
        assert_eq!(config.cache_backend, CacheBackend::Memory);
        assert_eq!(config.embedding_backend, EmbeddingBackend::Hashed);
    }
}
