pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod web;

// Re-export commonly used types
pub use application::BankService;
pub use config::AppConfig;
pub use domain::{Account, AccountError};
pub use infrastructure::{
    AccountRepository, AccountRepositoryTrait, Argon2PasswordScheme, EventStoreTrait,
    InMemoryEventStore, PasswordScheme,
};
