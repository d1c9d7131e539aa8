//! Card sessions: one simulated card each, plus the manager holding them

pub mod audit;
pub mod card_session;
pub mod manager;
pub mod state;

pub use audit::{AuditLog, LogEntry, LogKind};
pub use card_session::{CardSession, PSC_NOT_VERIFIED};
pub use manager::{SessionManager, SharedSession};
pub use state::AppState;
