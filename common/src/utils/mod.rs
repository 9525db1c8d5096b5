pub mod config;
pub mod embedding;
pub mod json;
pub mod llm;
pub mod retry;
