pub mod balance;
pub mod documents;
pub mod health;
pub mod query;
