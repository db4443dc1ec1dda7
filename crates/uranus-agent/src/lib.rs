//! Uranus Agent - user-space policy brain for hackernel
//!
//! The agent subscribes to process audit reports, keeps the audit trail,
//! promotes frequently repeated commands to trusted, and replays trusted
//! commands to the kernel on every start. A heartbeat watchdog turns loss
//! of contact with the kernel into process termination.

pub mod agent;
pub mod fatal;
pub mod promotion;
pub mod trust;
pub mod watchdog;

pub use agent::{AgentConfig, AgentError, ConfigSource, PolicyAgent, DEFAULT_GRACE_PERIOD};
pub use fatal::{FatalHandler, SignalTerminator};
pub use promotion::{
    CountThreshold, PromotionMode, PromotionStrategy, StatusTracked, DEFAULT_PROMOTION_THRESHOLD,
};
pub use trust::{TrustEngine, TrustOutcome};
pub use watchdog::{Watchdog, DEFAULT_HEARTBEAT_INTERVAL};
