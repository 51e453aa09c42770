pub mod database;
pub mod jwt;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod providers;

pub use database::Database;
pub use jwt::JwtService;
pub use ledger::CreditLedger;
pub use orchestrator::ChatOrchestrator;
