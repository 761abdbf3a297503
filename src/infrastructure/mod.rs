pub mod auth;
pub mod event_store;
pub mod repository;

pub use auth::{Argon2PasswordScheme, AuthError, PasswordScheme};
pub use event_store::{EventStoreError, EventStoreTrait, InMemoryEventStore, StreamAppend};
pub use repository::{AccountRepository, AccountRepositoryTrait, AggregateCommit};
