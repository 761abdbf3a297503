use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted event record. `version` is 1-based and gapless within an
/// aggregate's stream; ordering within a stream is total by version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub version: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    AccountOpened {
        account_id: Uuid,
        full_name: String,
        email_address: String,
        password_hash: String,
    },
    MoneyCredited {
        account_id: Uuid,
        amount_in_cents: i64,
    },
    MoneyDebited {
        account_id: Uuid,
        amount_in_cents: i64,
    },
    AccountClosed {
        account_id: Uuid,
    },
    PasswordChanged {
        account_id: Uuid,
        new_password_hash: String,
    },
    OverdraftLimitSet {
        account_id: Uuid,
        limit_in_cents: i64,
    },
}

impl AccountEvent {
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            AccountEvent::AccountOpened { account_id, .. } => *account_id,
            AccountEvent::MoneyCredited { account_id, .. } => *account_id,
            AccountEvent::MoneyDebited { account_id, .. } => *account_id,
            AccountEvent::AccountClosed { account_id } => *account_id,
            AccountEvent::PasswordChanged { account_id, .. } => *account_id,
            AccountEvent::OverdraftLimitSet { account_id, .. } => *account_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountOpened { .. } => "AccountOpened",
            AccountEvent::MoneyCredited { .. } => "MoneyCredited",
            AccountEvent::MoneyDebited { .. } => "MoneyDebited",
            AccountEvent::AccountClosed { .. } => "AccountClosed",
            AccountEvent::PasswordChanged { .. } => "PasswordChanged",
            AccountEvent::OverdraftLimitSet { .. } => "OverdraftLimitSet",
        }
    }
}
