pub mod component;
pub mod extraction;
pub mod intent;
pub mod query;
pub mod verification;
