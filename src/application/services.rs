use crate::domain::{Account, AccountCommand, AccountError};
use crate::infrastructure::auth::PasswordScheme;
use crate::infrastructure::repository::{AccountRepositoryTrait, AggregateCommit};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_MAX_COMMIT_RETRIES: u32 = 3;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
pub struct ServiceMetrics {
    pub commands_processed: AtomicU64,
    pub commands_failed: AtomicU64,
    pub commit_retries: AtomicU64,
}

/// Orchestrates account aggregates: loads them through the repository,
/// delegates validation to the aggregate, and commits the resulting events
/// under optimistic concurrency. Constructed explicitly and shared via `Arc`;
/// there is no ambient global instance, so tests can run isolated banks.
pub struct BankService {
    repository: Arc<dyn AccountRepositoryTrait>,
    password_scheme: Arc<dyn PasswordScheme>,
    max_commit_retries: u32,
    retry_backoff: Duration,
    metrics: Arc<ServiceMetrics>,
}

impl BankService {
    pub fn new(
        repository: Arc<dyn AccountRepositoryTrait>,
        password_scheme: Arc<dyn PasswordScheme>,
    ) -> Self {
        Self {
            repository,
            password_scheme,
            max_commit_retries: DEFAULT_MAX_COMMIT_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            metrics: Arc::new(ServiceMetrics::default()),
        }
    }

    pub fn with_retry_policy(mut self, max_commit_retries: u32, retry_backoff: Duration) -> Self {
        self.max_commit_retries = max_commit_retries;
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn metrics(&self) -> Arc<ServiceMetrics> {
        self.metrics.clone()
    }

    /// Deterministic account id: UUIDv5 of the email under the URL namespace.
    /// The same email always resolves to the same id, which makes lookup by
    /// email an O(1) derivation instead of a secondary index, at the cost of
    /// email being immutable after opening.
    pub fn account_id_for_email(email_address: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, email_address.as_bytes())
    }

    pub async fn open_account(
        &self,
        full_name: &str,
        email_address: &str,
        password: &str,
    ) -> Result<Uuid, AccountError> {
        let account_id = Self::account_id_for_email(email_address);
        if self.record(self.repository.get_by_id(account_id).await)?.is_some() {
            return Err(self.fail(AccountError::DuplicateAccount));
        }

        let password_hash = self
            .password_scheme
            .hash_password(password)
            .map_err(|e| self.fail(AccountError::InfrastructureError(e.to_string())))?;

        let command = AccountCommand::OpenAccount {
            account_id,
            full_name: full_name.to_string(),
            email_address: email_address.to_string(),
            password_hash,
        };
        let events = Account::default().handle_command(&command)?;

        let commit = AggregateCommit {
            aggregate_id: account_id,
            expected_version: 0,
            events,
        };
        match self.repository.save_all(vec![commit]).await {
            Ok(()) => {
                self.metrics.commands_processed.fetch_add(1, Ordering::Relaxed);
                info!(%account_id, email = %email_address, "account opened");
                Ok(account_id)
            }
            // Losing the open race means someone else created this account;
            // retrying with the same email can never succeed.
            Err(AccountError::VersionConflict { .. }) => {
                Err(self.fail(AccountError::DuplicateAccount))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub async fn deposit(
        &self,
        account_id: Uuid,
        amount_in_cents: i64,
    ) -> Result<(), AccountError> {
        if amount_in_cents <= 0 {
            return Err(self.fail(AccountError::InvalidAmount(amount_in_cents)));
        }
        self.mutate_account(account_id, |_| {
            Ok(AccountCommand::CreditAccount {
                account_id,
                amount_in_cents,
            })
        })
        .await?;
        debug!(%account_id, amount_in_cents, "deposit committed");
        Ok(())
    }

    pub async fn withdraw(
        &self,
        account_id: Uuid,
        amount_in_cents: i64,
    ) -> Result<(), AccountError> {
        if amount_in_cents <= 0 {
            return Err(self.fail(AccountError::InvalidAmount(amount_in_cents)));
        }
        self.mutate_account(account_id, |_| {
            Ok(AccountCommand::DebitAccount {
                account_id,
                amount_in_cents,
            })
        })
        .await?;
        debug!(%account_id, amount_in_cents, "withdrawal committed");
        Ok(())
    }

    /// Moves money between two accounts. The debit and credit events are
    /// committed with a single atomic multi-stream append: a rejected or
    /// conflicting target leg leaves the source stream unwritten, so the
    /// ledger never shows a debit without its matching credit.
    pub async fn transfer(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        amount_in_cents: i64,
    ) -> Result<(), AccountError> {
        if amount_in_cents <= 0 {
            return Err(self.fail(AccountError::InvalidAmount(amount_in_cents)));
        }
        if source_id == target_id {
            return Err(self.fail(AccountError::InvalidArgument(
                "source and target accounts must differ".to_string(),
            )));
        }

        let mut attempts = 0;
        let mut backoff = self.retry_backoff;
        loop {
            let source = self.load(source_id).await?;
            let target = self.load(target_id).await?;
            if source.is_closed || target.is_closed {
                return Err(self.fail(AccountError::AccountClosed));
            }

            let debit_events = source
                .handle_command(&AccountCommand::DebitAccount {
                    account_id: source_id,
                    amount_in_cents,
                })
                .map_err(|e| self.fail(e))?;
            let credit_events = target
                .handle_command(&AccountCommand::CreditAccount {
                    account_id: target_id,
                    amount_in_cents,
                })
                .map_err(|e| self.fail(e))?;

            let commits = vec![
                AggregateCommit::for_account(&source, debit_events),
                AggregateCommit::for_account(&target, credit_events),
            ];
            match self.repository.save_all(commits).await {
                Ok(()) => {
                    self.metrics.commands_processed.fetch_add(1, Ordering::Relaxed);
                    info!(%source_id, %target_id, amount_in_cents, "transfer committed");
                    return Ok(());
                }
                Err(AccountError::VersionConflict { expected, actual })
                    if attempts < self.max_commit_retries =>
                {
                    attempts += 1;
                    self.metrics.commit_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        %source_id, %target_id, expected, actual, attempts,
                        "transfer commit conflicted, reloading"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    pub async fn close_account(&self, account_id: Uuid) -> Result<(), AccountError> {
        self.mutate_account(account_id, |_| {
            Ok(AccountCommand::CloseAccount { account_id })
        })
        .await?;
        info!(%account_id, "account closed");
        Ok(())
    }

    pub async fn get_balance(&self, account_id: Uuid) -> Result<i64, AccountError> {
        Ok(self.load(account_id).await?.balance)
    }

    pub async fn set_overdraft_limit(
        &self,
        account_id: Uuid,
        limit_in_cents: i64,
    ) -> Result<(), AccountError> {
        if limit_in_cents < 0 {
            return Err(self.fail(AccountError::InvalidArgument(format!(
                "overdraft limit cannot be negative: {}",
                limit_in_cents
            ))));
        }
        self.mutate_account(account_id, |_| {
            Ok(AccountCommand::SetOverdraftLimit {
                account_id,
                limit_in_cents,
            })
        })
        .await?;
        info!(%account_id, limit_in_cents, "overdraft limit set");
        Ok(())
    }

    pub async fn get_overdraft_limit(&self, account_id: Uuid) -> Result<i64, AccountError> {
        Ok(self.load(account_id).await?.overdraft_limit)
    }

    /// Checks a password without producing any event. A mismatch is
    /// `BadCredentials`, deliberately distinct from `NotFound`.
    pub async fn validate_password(
        &self,
        account_id: Uuid,
        password: &str,
    ) -> Result<(), AccountError> {
        let account = self.load(account_id).await?;
        if !self
            .password_scheme
            .verify_password(password, &account.password_hash)
        {
            return Err(self.fail(AccountError::BadCredentials));
        }
        Ok(())
    }

    pub async fn change_password(
        &self,
        account_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AccountError> {
        self.mutate_account(account_id, |account| {
            // Re-verified against every freshly loaded state so a concurrent
            // password change invalidates the old credential mid-retry.
            if !self
                .password_scheme
                .verify_password(old_password, &account.password_hash)
            {
                return Err(AccountError::BadCredentials);
            }
            let new_password_hash = self
                .password_scheme
                .hash_password(new_password)
                .map_err(|e| AccountError::InfrastructureError(e.to_string()))?;
            Ok(AccountCommand::ChangePassword {
                account_id,
                new_password_hash,
            })
        })
        .await?;
        info!(%account_id, "password changed");
        Ok(())
    }

    pub async fn get_account(&self, account_id: Uuid) -> Result<Account, AccountError> {
        self.load(account_id).await
    }

    async fn load(&self, account_id: Uuid) -> Result<Account, AccountError> {
        self.record(self.repository.get_by_id(account_id).await)?
            .ok_or_else(|| self.fail(AccountError::NotFound))
    }

    /// Bounded load → validate → commit loop. A `VersionConflict` means
    /// another writer advanced the stream after our load: reload, re-validate
    /// the command against fresh state, and try again with backoff. Any other
    /// error is terminal for the call.
    async fn mutate_account<F>(&self, account_id: Uuid, make_command: F) -> Result<(), AccountError>
    where
        F: Fn(&Account) -> Result<AccountCommand, AccountError>,
    {
        let mut attempts = 0;
        let mut backoff = self.retry_backoff;
        loop {
            let account = self.load(account_id).await?;
            let command = make_command(&account).map_err(|e| self.fail(e))?;
            let events = account.handle_command(&command).map_err(|e| self.fail(e))?;

            match self.repository.save(&account, events).await {
                Ok(()) => {
                    self.metrics.commands_processed.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(AccountError::VersionConflict { expected, actual })
                    if attempts < self.max_commit_retries =>
                {
                    attempts += 1;
                    self.metrics.commit_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        %account_id, expected, actual, attempts,
                        "commit conflicted, reloading"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    fn record<T>(&self, result: Result<T, AccountError>) -> Result<T, AccountError> {
        result.map_err(|e| self.fail(e))
    }

    fn fail(&self, error: AccountError) -> AccountError {
        self.metrics.commands_failed.fetch_add(1, Ordering::Relaxed);
        error
    }
}
