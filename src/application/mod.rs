pub mod services;

pub use services::{BankService, ServiceMetrics};
