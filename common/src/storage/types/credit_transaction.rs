use uuid::Uuid;

use crate::stored_object;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Usage,
    Purchase,
    Grant,
}

stored_object!(CreditTransaction, "credit_transaction", {
    account_id: String,
    kind: TransactionKind,
    /// Negative for debits.
    amount: i64,
    balance_after: i64,
    #[serde(default)]
    usage_event_id: Option<String>,
    description: String
});

impl CreditTransaction {
    pub fn new(
        account_id: String,
        kind: TransactionKind,
        amount: i64,
        balance_after: i64,
        usage_event_id: Option<String>,
        description: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            account_id,
            kind,
            amount,
            balance_after,
            usage_event_id,
            description,
        }
    }

    pub fn usage(account_id: String, debited: i64, balance_after: i64, event_id: &str) -> Self {
        Self::new(
            account_id,
            TransactionKind::Usage,
            -debited,
            balance_after,
            Some(event_id.to_string()),
            format!("Query usage: {debited} credits"),
        )
    }
}
