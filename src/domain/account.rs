use crate::domain::{AccountCommand, AccountEvent};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Current state of an account aggregate, derived by folding its event
/// stream. Never persisted directly; `version` counts the events applied so
/// far and doubles as the optimistic-concurrency token at commit time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub full_name: String,
    pub email_address: String,
    pub password_hash: String,
    /// Balance in cents. May go negative, but never below `-overdraft_limit`.
    pub balance: i64,
    /// Overdraft allowance in cents, never negative.
    pub overdraft_limit: i64,
    pub is_closed: bool,
    pub version: i64,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AccountError {
    #[error("Account not found")]
    NotFound,
    #[error("Account already exists")]
    DuplicateAccount,
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Account is closed")]
    AccountClosed,
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },
    #[error("Bad credentials")]
    BadCredentials,
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: i64, actual: i64 },
    #[error("Corrupted event log: {0}")]
    CorruptedEventLog(String),
    #[error("Infrastructure error: {0}")]
    InfrastructureError(String),
}

impl Account {
    /// Validates a command against current state and produces the events it
    /// implies. A rejected command produces no events, so stored state is
    /// never partially updated.
    pub fn handle_command(
        &self,
        command: &AccountCommand,
    ) -> Result<Vec<AccountEvent>, AccountError> {
        match command {
            AccountCommand::OpenAccount {
                account_id,
                full_name,
                email_address,
                password_hash,
            } => {
                if self.version > 0 {
                    return Err(AccountError::DuplicateAccount);
                }
                Ok(vec![AccountEvent::AccountOpened {
                    account_id: *account_id,
                    full_name: full_name.clone(),
                    email_address: email_address.clone(),
                    password_hash: password_hash.clone(),
                }])
            }
            AccountCommand::CreditAccount {
                account_id,
                amount_in_cents,
            } => {
                if *amount_in_cents <= 0 {
                    return Err(AccountError::InvalidAmount(*amount_in_cents));
                }
                if self.is_closed {
                    return Err(AccountError::AccountClosed);
                }
                Ok(vec![AccountEvent::MoneyCredited {
                    account_id: *account_id,
                    amount_in_cents: *amount_in_cents,
                }])
            }
            AccountCommand::DebitAccount {
                account_id,
                amount_in_cents,
            } => {
                if *amount_in_cents <= 0 {
                    return Err(AccountError::InvalidAmount(*amount_in_cents));
                }
                if self.is_closed {
                    return Err(AccountError::AccountClosed);
                }
                let effective_balance = self.balance + self.overdraft_limit;
                if *amount_in_cents > effective_balance {
                    return Err(AccountError::InsufficientFunds {
                        available: effective_balance,
                        requested: *amount_in_cents,
                    });
                }
                Ok(vec![AccountEvent::MoneyDebited {
                    account_id: *account_id,
                    amount_in_cents: *amount_in_cents,
                }])
            }
            AccountCommand::CloseAccount { account_id } => {
                if self.is_closed {
                    return Err(AccountError::AccountClosed);
                }
                Ok(vec![AccountEvent::AccountClosed {
                    account_id: *account_id,
                }])
            }
            // Credential verification happens at the service seam, against
            // this aggregate's digest; the aggregate only records the new
            // digest. No closed-state check: closed accounts keep a usable
            // credential.
            AccountCommand::ChangePassword {
                account_id,
                new_password_hash,
            } => Ok(vec![AccountEvent::PasswordChanged {
                account_id: *account_id,
                new_password_hash: new_password_hash.clone(),
            }]),
            AccountCommand::SetOverdraftLimit {
                account_id,
                limit_in_cents,
            } => {
                if *limit_in_cents < 0 {
                    return Err(AccountError::InvalidArgument(format!(
                        "overdraft limit cannot be negative: {}",
                        limit_in_cents
                    )));
                }
                if self.is_closed {
                    return Err(AccountError::AccountClosed);
                }
                Ok(vec![AccountEvent::OverdraftLimitSet {
                    account_id: *account_id,
                    limit_in_cents: *limit_in_cents,
                }])
            }
        }
    }

    /// Pure fold step. Commands are validated before events are emitted, so
    /// applying a stored event cannot fail.
    pub fn apply_event(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::AccountOpened {
                account_id,
                full_name,
                email_address,
                password_hash,
            } => {
                self.id = *account_id;
                self.full_name = full_name.clone();
                self.email_address = email_address.clone();
                self.password_hash = password_hash.clone();
                self.balance = 0;
                self.overdraft_limit = 0;
                self.is_closed = false;
            }
            AccountEvent::MoneyCredited {
                amount_in_cents, ..
            } => {
                self.balance += amount_in_cents;
            }
            AccountEvent::MoneyDebited {
                amount_in_cents, ..
            } => {
                self.balance -= amount_in_cents;
            }
            AccountEvent::AccountClosed { .. } => {
                self.is_closed = true;
            }
            AccountEvent::PasswordChanged {
                new_password_hash, ..
            } => {
                self.password_hash = new_password_hash.clone();
            }
            AccountEvent::OverdraftLimitSet {
                limit_in_cents, ..
            } => {
                self.overdraft_limit = *limit_in_cents;
            }
        }
        self.version += 1;
        debug_assert!(self.balance >= -self.overdraft_limit);
        debug_assert!(self.overdraft_limit >= 0);
    }

    /// Reconstructs an account by replaying its event stream in order.
    ///
    /// Deterministic and side-effect free: replaying the same stream twice
    /// yields identical state. A stream that is empty or does not begin with
    /// `AccountOpened` is corrupt history, which is fatal rather than a
    /// business error.
    pub fn replay(events: &[AccountEvent]) -> Result<Account, AccountError> {
        let first = events.first().ok_or_else(|| {
            AccountError::CorruptedEventLog("empty event stream".to_string())
        })?;
        if !matches!(first, AccountEvent::AccountOpened { .. }) {
            return Err(AccountError::CorruptedEventLog(format!(
                "stream starts with {} instead of AccountOpened",
                first.event_type()
            )));
        }
        let mut account = Account::default();
        for event in events {
            account.apply_event(event);
        }
        Ok(account)
    }
}

impl Default for Account {
    fn default() -> Self {
        Account {
            id: Uuid::nil(),
            full_name: String::new(),
            email_address: String::new(),
            password_hash: String::new(),
            balance: 0,
            overdraft_limit: 0,
            is_closed: false,
            version: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened(id: Uuid) -> AccountEvent {
        AccountEvent::AccountOpened {
            account_id: id,
            full_name: "Alice Example".to_string(),
            email_address: "alice@example.com".to_string(),
            password_hash: "digest".to_string(),
        }
    }

    fn open_account() -> Account {
        Account::replay(&[opened(Uuid::new_v4())]).unwrap()
    }

    #[test]
    fn open_sets_initial_state() {
        let id = Uuid::new_v4();
        let account = Account::replay(&[opened(id)]).unwrap();
        assert_eq!(account.id, id);
        assert_eq!(account.balance, 0);
        assert_eq!(account.overdraft_limit, 0);
        assert_eq!(account.version, 1);
        assert!(!account.is_closed);
    }

    #[test]
    fn open_on_existing_history_is_duplicate() {
        let account = open_account();
        let command = AccountCommand::OpenAccount {
            account_id: account.id,
            full_name: "Alice Example".to_string(),
            email_address: "alice@example.com".to_string(),
            password_hash: "digest".to_string(),
        };
        assert_eq!(
            account.handle_command(&command),
            Err(AccountError::DuplicateAccount)
        );
    }

    #[test]
    fn credit_and_debit_move_the_balance() {
        let mut account = open_account();
        let events = account
            .handle_command(&AccountCommand::CreditAccount {
                account_id: account.id,
                amount_in_cents: 1_000,
            })
            .unwrap();
        for event in &events {
            account.apply_event(event);
        }
        assert_eq!(account.balance, 1_000);

        let events = account
            .handle_command(&AccountCommand::DebitAccount {
                account_id: account.id,
                amount_in_cents: 400,
            })
            .unwrap();
        for event in &events {
            account.apply_event(event);
        }
        assert_eq!(account.balance, 600);
        assert_eq!(account.version, 3);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let account = open_account();
        for amount in [0, -5] {
            assert_eq!(
                account.handle_command(&AccountCommand::CreditAccount {
                    account_id: account.id,
                    amount_in_cents: amount,
                }),
                Err(AccountError::InvalidAmount(amount))
            );
            assert_eq!(
                account.handle_command(&AccountCommand::DebitAccount {
                    account_id: account.id,
                    amount_in_cents: amount,
                }),
                Err(AccountError::InvalidAmount(amount))
            );
        }
    }

    #[test]
    fn debit_boundary_at_effective_balance() {
        let mut account = open_account();
        account.apply_event(&AccountEvent::MoneyCredited {
            account_id: account.id,
            amount_in_cents: 1_000,
        });
        account.apply_event(&AccountEvent::OverdraftLimitSet {
            account_id: account.id,
            limit_in_cents: 500,
        });

        // Exactly balance + overdraft succeeds and lands on -overdraft.
        let events = account
            .handle_command(&AccountCommand::DebitAccount {
                account_id: account.id,
                amount_in_cents: 1_500,
            })
            .unwrap();
        let mut drained = account.clone();
        for event in &events {
            drained.apply_event(event);
        }
        assert_eq!(drained.balance, -500);

        // One cent more fails and leaves the account untouched.
        assert_eq!(
            account.handle_command(&AccountCommand::DebitAccount {
                account_id: account.id,
                amount_in_cents: 1_501,
            }),
            Err(AccountError::InsufficientFunds {
                available: 1_500,
                requested: 1_501,
            })
        );
        assert_eq!(account.balance, 1_000);
    }

    #[test]
    fn closed_account_rejects_mutation() {
        let mut account = open_account();
        account.apply_event(&AccountEvent::AccountClosed {
            account_id: account.id,
        });
        let before = account.clone();

        let commands = [
            AccountCommand::CreditAccount {
                account_id: account.id,
                amount_in_cents: 100,
            },
            AccountCommand::DebitAccount {
                account_id: account.id,
                amount_in_cents: 100,
            },
            AccountCommand::SetOverdraftLimit {
                account_id: account.id,
                limit_in_cents: 100,
            },
            AccountCommand::CloseAccount {
                account_id: account.id,
            },
        ];
        for command in &commands {
            assert_eq!(
                account.handle_command(command),
                Err(AccountError::AccountClosed)
            );
        }
        assert_eq!(account, before);
    }

    #[test]
    fn password_change_survives_close() {
        let mut account = open_account();
        account.apply_event(&AccountEvent::AccountClosed {
            account_id: account.id,
        });
        let events = account
            .handle_command(&AccountCommand::ChangePassword {
                account_id: account.id,
                new_password_hash: "digest2".to_string(),
            })
            .unwrap();
        for event in &events {
            account.apply_event(event);
        }
        assert_eq!(account.password_hash, "digest2");
    }

    #[test]
    fn negative_overdraft_limit_is_rejected() {
        let account = open_account();
        assert!(matches!(
            account.handle_command(&AccountCommand::SetOverdraftLimit {
                account_id: account.id,
                limit_in_cents: -1,
            }),
            Err(AccountError::InvalidArgument(_))
        ));
    }

    #[test]
    fn replay_is_deterministic() {
        let id = Uuid::new_v4();
        let events = vec![
            opened(id),
            AccountEvent::MoneyCredited {
                account_id: id,
                amount_in_cents: 2_000,
            },
            AccountEvent::OverdraftLimitSet {
                account_id: id,
                limit_in_cents: 300,
            },
            AccountEvent::MoneyDebited {
                account_id: id,
                amount_in_cents: 750,
            },
        ];

        let once = Account::replay(&events).unwrap();
        let twice = Account::replay(&events).unwrap();
        assert_eq!(once, twice);

        // Prefix then suffix equals the whole stream in one pass.
        let mut prefixed = Account::replay(&events[..2]).unwrap();
        for event in &events[2..] {
            prefixed.apply_event(event);
        }
        assert_eq!(prefixed, once);
    }

    #[test]
    fn replay_rejects_corrupt_history() {
        assert!(matches!(
            Account::replay(&[]),
            Err(AccountError::CorruptedEventLog(_))
        ));
        assert!(matches!(
            Account::replay(&[AccountEvent::MoneyCredited {
                account_id: Uuid::new_v4(),
                amount_in_cents: 100,
            }]),
            Err(AccountError::CorruptedEventLog(_))
        ));
    }
}
