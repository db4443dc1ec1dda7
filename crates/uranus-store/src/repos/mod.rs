//! Repository implementations

pub mod audit;
pub mod config;

pub use audit::AuditRepo;
pub use config::ConfigRepo;
