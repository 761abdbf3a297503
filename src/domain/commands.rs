use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Commands carry already-hashed credential material; producing and checking
/// digests is the password scheme's job, not the aggregate's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AccountCommand {
    OpenAccount {
        account_id: Uuid,
        full_name: String,
        email_address: String,
        password_hash: String,
    },
    CreditAccount {
        account_id: Uuid,
        amount_in_cents: i64,
    },
    DebitAccount {
        account_id: Uuid,
        amount_in_cents: i64,
    },
    CloseAccount {
        account_id: Uuid,
    },
    ChangePassword {
        account_id: Uuid,
        new_password_hash: String,
    },
    SetOverdraftLimit {
        account_id: Uuid,
        limit_in_cents: i64,
    },
}
