pub mod db;
pub mod indexes;
pub mod repositories;
pub mod types;
pub mod vector_index;
