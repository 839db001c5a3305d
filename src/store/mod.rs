//! Append-only persistence for group ledgers.
//!
//! A store keeps one [`GroupLedger`] per group. Writes carry the version the
//! caller read; a store refuses the write with [`LedgerError::Conflict`] when
//! somebody else wrote in between, which keeps a group's history consistent
//! even with several writers.
//!
//! [`LedgerError::Conflict`]: crate::error::LedgerError::Conflict
use async_trait::async_trait;

use crate::error::LedgerResult;
use crate::schemas::{Expense, Group, GroupLedger, Member, Payment};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fails with `Conflict` if a group with the same id exists.
    async fn insert_group(&self, ledger: GroupLedger) -> LedgerResult<()>;

    /// Point-in-time snapshot of a group and its full history.
    async fn load(&self, group_id: &str) -> LedgerResult<GroupLedger>;

    async fn groups_for_member(&self, member_id: &str) -> LedgerResult<Vec<Group>>;

    async fn add_member(&self, group_id: &str, version: i64, member: Member) -> LedgerResult<()>;

    async fn append_expense(&self, group_id: &str, version: i64, expense: Expense)
        -> LedgerResult<()>;

    async fn append_payment(&self, group_id: &str, version: i64, payment: Payment)
        -> LedgerResult<()>;

    /// Removes the group together with all of its expenses and payments.
    async fn delete_group(&self, group_id: &str) -> LedgerResult<()>;
}
