use chrono::{Duration, Months};

use crate::{error::AppError, stored_object};

/// Who a balance belongs to. A signed-in user and an anonymous session never share an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AccountIdentity {
    User(String),
    Session(String),
}

impl AccountIdentity {
    /// Stable record id for the account owned by this identity.
    pub fn account_id(&self) -> String {
        match self {
            AccountIdentity::User(id) => format!("user_{id}"),
            AccountIdentity::Session(id) => format!("session_{id}"),
        }
    }

    pub fn default_reset_period(&self) -> ResetPeriod {
        match self {
            AccountIdentity::User(_) => ResetPeriod::Monthly,
            AccountIdentity::Session(_) => ResetPeriod::Daily,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPeriod {
    Daily,
    Monthly,
}

impl ResetPeriod {
    pub fn next_after(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ResetPeriod::Daily => now + Duration::days(1),
            ResetPeriod::Monthly => now
                .checked_add_months(Months::new(1))
                .unwrap_or_else(|| now + Duration::days(30)),
        }
    }
}

stored_object!(CreditAccount, "credit_account", {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    credits: i64,
    free_tier_remaining: i64,
    free_tier_allowance: i64,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime")]
    free_tier_reset_at: DateTime<Utc>,
    reset_period: ResetPeriod,
    /// True until the account first buys or is granted credits.
    is_free_tier: bool
});

impl CreditAccount {
    pub fn new(
        identity: &AccountIdentity,
        free_tier_allowance: i64,
        reset_period: ResetPeriod,
        now: DateTime<Utc>,
    ) -> Self {
        let (user_id, session_id) = match identity {
            AccountIdentity::User(id) => (Some(id.clone()), None),
            AccountIdentity::Session(id) => (None, Some(id.clone())),
        };
        let allowance = free_tier_allowance.max(0);

        Self {
            id: identity.account_id(),
            created_at: now,
            updated_at: now,
            user_id,
            session_id,
            credits: 0,
            free_tier_remaining: allowance,
            free_tier_allowance: allowance,
            free_tier_reset_at: reset_period.next_after(now),
            reset_period,
            is_free_tier: true,
        }
    }

    pub fn has_free_tier(&self) -> bool {
        self.free_tier_remaining > 0
    }

    pub fn can_query(&self) -> bool {
        self.has_free_tier() || self.credits > 0
    }

    /// Charges one query and returns the credits actually debited.
    ///
    /// With `use_free_tier_first` and free tier remaining, one free unit is used and nothing is
    /// debited whatever `amount` is. Otherwise `amount` comes off the credits; when the balance
    /// cannot cover it the account is left untouched.
    pub fn consume(&mut self, amount: i64, use_free_tier_first: bool) -> Result<i64, AppError> {
        if amount < 0 {
            return Err(AppError::Validation(format!(
                "cannot consume a negative amount ({amount})"
            )));
        }

        if use_free_tier_first && self.has_free_tier() {
            self.free_tier_remaining -= 1;
            self.updated_at = Utc::now();
            return Ok(0);
        }

        if self.credits < amount {
            return Err(AppError::InsufficientCredits {
                required: amount,
                available: self.credits,
            });
        }

        self.credits -= amount;
        self.updated_at = Utc::now();
        Ok(amount)
    }

    /// Refills the free tier once its reset time has passed. Returns whether a reset happened.
    pub fn reset_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.free_tier_reset_at {
            return false;
        }
        self.free_tier_remaining = self.free_tier_allowance;
        self.free_tier_reset_at = self.reset_period.next_after(now);
        self.updated_at = now;
        true
    }

    pub fn add_credits(&mut self, amount: i64) -> Result<i64, AppError> {
        if amount <= 0 {
            return Err(AppError::Validation(format!(
                "credit grants must be positive, got {amount}"
            )));
        }
        self.credits = self.credits.saturating_add(amount);
        self.is_free_tier = false;
        self.updated_at = Utc::now();
        Ok(self.credits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paid_account(credits: i64) -> CreditAccount {
        let mut account = CreditAccount::new(
            &AccountIdentity::Session("s-1".into()),
            0,
            ResetPeriod::Daily,
            Utc::now(),
        );
        account.credits = credits;
        account
    }

    #[test]
    fn identities_map_to_distinct_accounts() {
        let user = AccountIdentity::User("42".into());
        let session = AccountIdentity::Session("42".into());
        assert_eq!(user.account_id(), "user_42");
        assert_eq!(session.account_id(), "session_42");
        assert_eq!(user.default_reset_period(), ResetPeriod::Monthly);
        assert_eq!(session.default_reset_period(), ResetPeriod::Daily);

        let account = CreditAccount::new(&user, 100, ResetPeriod::Monthly, Utc::now());
        assert_eq!(account.id, "user_42");
        assert_eq!(account.user_id.as_deref(), Some("42"));
        assert!(account.session_id.is_none());
    }

    #[test]
    fn free_tier_is_used_before_credits() {
        let mut account = CreditAccount::new(
            &AccountIdentity::Session("s".into()),
            2,
            ResetPeriod::Daily,
            Utc::now(),
        );
        account.credits = 50;

        assert!(account.has_free_tier());
        assert_eq!(account.consume(30, true).expect("free"), 0);
        assert_eq!(account.consume(30, true).expect("free"), 0);
        assert_eq!(account.free_tier_remaining, 0);
        assert_eq!(account.credits, 50);

        assert!(!account.has_free_tier());
        assert_eq!(account.consume(30, true).expect("paid"), 30);
        assert_eq!(account.credits, 20);
    }

    #[test]
    fn consume_debits_credits_when_free_tier_is_spent() {
        let mut account = paid_account(5);
        let charged = account.consume(1, true).expect("consume");
        assert_eq!(charged, 1);
        assert_eq!(account.credits, 4);
    }

    #[test]
    fn consume_fails_without_touching_the_balance() {
        let mut account = paid_account(5);
        let err = account.consume(10, true).expect_err("should fail");
        assert!(matches!(
            err,
            AppError::InsufficientCredits {
                required: 10,
                available: 5
            }
        ));
        assert_eq!(account.credits, 5);
        assert_eq!(account.free_tier_remaining, 0);
    }

    #[test]
    fn consume_skips_free_tier_when_asked() {
        let mut account = CreditAccount::new(
            &AccountIdentity::Session("s".into()),
            3,
            ResetPeriod::Daily,
            Utc::now(),
        );
        account.credits = 10;
        assert_eq!(account.consume(4, false).expect("paid"), 4);
        assert_eq!(account.free_tier_remaining, 3);
        assert_eq!(account.credits, 6);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let mut account = paid_account(5);
        assert!(matches!(
            account.consume(-1, true),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(account.add_credits(0), Err(AppError::Validation(_))));
    }

    #[test]
    fn can_query_tracks_free_tier_and_credits() {
        let mut account = paid_account(0);
        assert!(!account.can_query());
        account.add_credits(3).expect("grant");
        assert!(account.can_query());
        assert!(!account.is_free_tier);
    }

    #[test]
    fn free_tier_resets_after_the_period() {
        let now = Utc::now();
        let mut account = CreditAccount::new(
            &AccountIdentity::Session("s".into()),
            10,
            ResetPeriod::Daily,
            now,
        );
        account.free_tier_remaining = 0;

        assert!(!account.reset_if_due(now + Duration::hours(23)));
        assert_eq!(account.free_tier_remaining, 0);

        let later = now + Duration::hours(25);
        assert!(account.reset_if_due(later));
        assert_eq!(account.free_tier_remaining, 10);
        assert_eq!(account.free_tier_reset_at, later + Duration::days(1));
    }
}
