use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};

use crate::{
    billing::cost::CostBreakdown,
    error::AppError,
    storage::{
        db::SurrealDbClient,
        repositories::{
            AccountRepository, InMemoryBillingStore, SurrealBillingStore, TransactionRepository,
            UsageEventRepository,
        },
        types::{
            credit_account::{AccountIdentity, CreditAccount},
            credit_transaction::{CreditTransaction, TransactionKind},
            usage_event::UsageEvent,
        },
    },
    utils::config::AppConfig,
};

/// Free queries granted per reset period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeTierPolicy {
    pub anonymous_daily: i64,
    pub user_monthly: i64,
}

impl Default for FreeTierPolicy {
    fn default() -> Self {
        Self {
            anonymous_daily: 10,
            user_monthly: 100,
        }
    }
}

impl FreeTierPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            anonymous_daily: config.anonymous_free_queries,
            user_monthly: config.user_free_queries,
        }
    }

    fn allowance_for(&self, identity: &AccountIdentity) -> i64 {
        match identity {
            AccountIdentity::User(_) => self.user_monthly,
            AccountIdentity::Session(_) => self.anonymous_daily,
        }
    }
}

/// One finished pipeline run waiting to be billed.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub query: &'a str,
    pub cached: bool,
    pub cost: CostBreakdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeReceipt {
    pub credits_charged: i64,
    pub balance_remaining: i64,
    pub free_tier_remaining: i64,
    pub usage_event_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    pub credits: i64,
    pub free_tier_remaining: i64,
    pub free_tier_allowance: i64,
    pub free_tier_reset_at: DateTime<Utc>,
    pub is_free_tier: bool,
    pub can_query: bool,
}

impl From<&CreditAccount> for BalanceSnapshot {
    fn from(account: &CreditAccount) -> Self {
        Self {
            credits: account.credits,
            free_tier_remaining: account.free_tier_remaining,
            free_tier_allowance: account.free_tier_allowance,
            free_tier_reset_at: account.free_tier_reset_at,
            is_free_tier: account.is_free_tier,
            can_query: account.can_query(),
        }
    }
}

/// Owns every balance mutation. Reads and writes for one account happen under that account's lock.
pub struct CreditLedger {
    accounts: Arc<dyn AccountRepository>,
    events: Arc<dyn UsageEventRepository>,
    transactions: Arc<dyn TransactionRepository>,
    policy: FreeTierPolicy,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CreditLedger {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        events: Arc<dyn UsageEventRepository>,
        transactions: Arc<dyn TransactionRepository>,
        policy: FreeTierPolicy,
    ) -> Self {
        Self {
            accounts,
            events,
            transactions,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn surreal(db: Arc<SurrealDbClient>, policy: FreeTierPolicy) -> Self {
        let store = Arc::new(SurrealBillingStore::new(db));
        Self::new(Arc::clone(&store) as _, Arc::clone(&store) as _, store, policy)
    }

    pub fn in_memory(store: Arc<InMemoryBillingStore>, policy: FreeTierPolicy) -> Self {
        Self::new(Arc::clone(&store) as _, Arc::clone(&store) as _, store, policy)
    }

    /// Per-account lock. Entries nobody holds or waits on are dropped on the way in, so the map
    /// only tracks accounts with work in flight.
    async fn lock(&self, identity: &AccountIdentity) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(identity.account_id()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Loads the account, creating it or refilling its free tier as needed. Caller holds the lock.
    async fn load(&self, identity: &AccountIdentity) -> Result<CreditAccount, AppError> {
        let now = Utc::now();
        match self.accounts.get(identity).await? {
            Some(mut account) => {
                if account.reset_if_due(now) {
                    debug!(account = %account.id, "Free tier refilled");
                    account = self.accounts.update(account).await?;
                }
                Ok(account)
            }
            None => {
                let account = CreditAccount::new(
                    identity,
                    self.policy.allowance_for(identity),
                    identity.default_reset_period(),
                    now,
                );
                info!(account = %account.id, "Creating credit account");
                self.accounts.create(account).await
            }
        }
    }

    pub async fn ensure_account(
        &self,
        identity: &AccountIdentity,
    ) -> Result<CreditAccount, AppError> {
        let _guard = self.lock(identity).await;
        self.load(identity).await
    }

    /// Fails with a payment-required error when the account can't run another query.
    pub async fn authorize(&self, identity: &AccountIdentity) -> Result<BalanceSnapshot, AppError> {
        let account = self.ensure_account(identity).await?;
        if !account.can_query() {
            return Err(AppError::InsufficientCredits {
                required: 1,
                available: account.credits,
            });
        }
        Ok(BalanceSnapshot::from(&account))
    }

    pub async fn balance(&self, identity: &AccountIdentity) -> Result<BalanceSnapshot, AppError> {
        let account = self.ensure_account(identity).await?;
        Ok(BalanceSnapshot::from(&account))
    }

    /// Bills one invocation and records it.
    ///
    /// Cache hits are free for accounts without free tier left. Accounts with free tier left spend
    /// one unit per query, cached or not. Everyone else pays `cost.total_credits`.
    #[instrument(skip_all, fields(account = %identity.account_id(), cached = invocation.cached))]
    pub async fn charge(
        &self,
        identity: &AccountIdentity,
        invocation: Invocation<'_>,
    ) -> Result<ChargeReceipt, AppError> {
        let _guard = self.lock(identity).await;
        let mut account = self.load(identity).await?;

        let cost = if invocation.cached {
            CostBreakdown::zero()
        } else {
            invocation.cost
        };

        let charged = if invocation.cached && !account.has_free_tier() {
            0
        } else {
            let charged = account.consume(cost.total_credits, true)?;
            account = self.accounts.update(account).await?;
            charged
        };

        let event = self
            .events
            .create(UsageEvent::for_query(
                account.id.clone(),
                account.session_id.clone(),
                account.user_id.clone(),
                invocation.query,
                invocation.cached,
                cost,
                charged,
            ))
            .await?;

        if charged > 0 {
            self.transactions
                .create(CreditTransaction::usage(
                    account.id.clone(),
                    charged,
                    account.credits,
                    &event.id,
                ))
                .await?;
        }

        debug!(
            charged,
            credits = account.credits,
            free_tier_remaining = account.free_tier_remaining,
            "Invocation billed"
        );

        Ok(ChargeReceipt {
            credits_charged: charged,
            balance_remaining: account.credits,
            free_tier_remaining: account.free_tier_remaining,
            usage_event_id: event.id,
        })
    }

    pub async fn grant_credits(
        &self,
        identity: &AccountIdentity,
        amount: i64,
        kind: TransactionKind,
        description: &str,
    ) -> Result<BalanceSnapshot, AppError> {
        let _guard = self.lock(identity).await;
        let mut account = self.load(identity).await?;
        let balance = account.add_credits(amount)?;
        let account = self.accounts.update(account).await?;

        self.transactions
            .create(CreditTransaction::new(
                account.id.clone(),
                kind,
                amount,
                balance,
                None,
                description.to_string(),
            ))
            .await?;

        info!(account = %account.id, amount, balance, "Credits added");
        Ok(BalanceSnapshot::from(&account))
    }
}
