//! SplitFlow: shared-expense ledger for groups.
//!
//! Expenses are split into per-member shares when they are logged, balances
//! are replayed from the append-only history on demand, and a settlement
//! plan turns balances into transfers.
pub mod analytics;
pub mod api;
pub mod auth;
pub mod balance;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod report;
pub mod schemas;
pub mod settings;
pub mod split;
pub mod store;

pub use error::{LedgerError, LedgerResult};
pub use ledger::Ledger;
