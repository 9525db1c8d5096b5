use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            credit_account::{AccountIdentity, CreditAccount},
            credit_transaction::CreditTransaction,
            usage_event::UsageEvent,
        },
    },
};

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get(&self, identity: &AccountIdentity) -> Result<Option<CreditAccount>, AppError>;
    async fn create(&self, account: CreditAccount) -> Result<CreditAccount, AppError>;
    async fn update(&self, account: CreditAccount) -> Result<CreditAccount, AppError>;
}

#[async_trait]
pub trait UsageEventRepository: Send + Sync {
    async fn create(&self, event: UsageEvent) -> Result<UsageEvent, AppError>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn create(&self, transaction: CreditTransaction) -> Result<CreditTransaction, AppError>;
}

/// SurrealDB-backed persistence for every billing record.
#[derive(Clone)]
pub struct SurrealBillingStore {
    db: Arc<SurrealDbClient>,
}

impl SurrealBillingStore {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }
}

fn stored<T>(item: Option<T>, what: &str) -> Result<T, AppError> {
    item.ok_or_else(|| AppError::InternalError(format!("{what} was not returned by the store")))
}

#[async_trait]
impl AccountRepository for SurrealBillingStore {
    async fn get(&self, identity: &AccountIdentity) -> Result<Option<CreditAccount>, AppError> {
        Ok(self
            .db
            .get_item::<CreditAccount>(&identity.account_id())
            .await?)
    }

    async fn create(&self, account: CreditAccount) -> Result<CreditAccount, AppError> {
        stored(self.db.store_item(account).await?, "credit account")
    }

    async fn update(&self, account: CreditAccount) -> Result<CreditAccount, AppError> {
        stored(self.db.upsert_item(account).await?, "credit account")
    }
}

#[async_trait]
impl UsageEventRepository for SurrealBillingStore {
    async fn create(&self, event: UsageEvent) -> Result<UsageEvent, AppError> {
        stored(self.db.store_item(event).await?, "usage event")
    }
}

#[async_trait]
impl TransactionRepository for SurrealBillingStore {
    async fn create(&self, transaction: CreditTransaction) -> Result<CreditTransaction, AppError> {
        stored(self.db.store_item(transaction).await?, "credit transaction")
    }
}

/// Process-local billing store for tests and single-node setups.
#[derive(Default)]
pub struct InMemoryBillingStore {
    accounts: RwLock<HashMap<String, CreditAccount>>,
    events: RwLock<Vec<UsageEvent>>,
    transactions: RwLock<Vec<CreditTransaction>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<UsageEvent> {
        self.events.read().await.clone()
    }

    pub async fn transactions(&self) -> Vec<CreditTransaction> {
        self.transactions.read().await.clone()
    }
}

#[async_trait]
impl AccountRepository for InMemoryBillingStore {
    async fn get(&self, identity: &AccountIdentity) -> Result<Option<CreditAccount>, AppError> {
        Ok(self
            .accounts
            .read()
            .await
            .get(&identity.account_id())
            .cloned())
    }

    async fn create(&self, account: CreditAccount) -> Result<CreditAccount, AppError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.id) {
            return Err(AppError::Validation(format!(
                "account {} already exists",
                account.id
            )));
        }
        accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn update(&self, account: CreditAccount) -> Result<CreditAccount, AppError> {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account.clone());
        Ok(account)
    }
}

#[async_trait]
impl UsageEventRepository for InMemoryBillingStore {
    async fn create(&self, event: UsageEvent) -> Result<UsageEvent, AppError> {
        self.events.write().await.push(event.clone());
        Ok(event)
    }
}

#[async_trait]
impl TransactionRepository for InMemoryBillingStore {
    async fn create(&self, transaction: CreditTransaction) -> Result<CreditTransaction, AppError> {
        self.transactions.write().await.push(transaction.clone());
        Ok(transaction)
    }
}
