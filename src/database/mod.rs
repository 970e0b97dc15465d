//! PostgreSQL Database Module
//!
//! Provides persistence for members, the trust ledger, and moderated content.

pub mod content;
pub mod ledger;
pub mod members;
pub mod pool;
pub mod store;

pub use content::ContentRepository;
pub use ledger::LedgerRepository;
pub use members::MemberRepository;
pub use pool::DatabasePool;
pub use store::PgTrustStore;
