pub mod billing;
pub mod chat;
pub mod executions;
pub mod health;
pub mod metrics;
