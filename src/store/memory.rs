use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::LedgerStore;
use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{Expense, Group, GroupId, GroupLedger, Member, Payment};

/// Keeps every ledger in process memory. Used for tests and single-node
/// deployments that do not need durability.
#[derive(Default)]
pub struct MemoryStore {
    groups: RwLock<HashMap<GroupId, GroupLedger>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn write_at<F>(&self, group_id: &str, version: i64, write: F) -> LedgerResult<()>
    where
        F: FnOnce(&mut GroupLedger) + Send,
    {
        let mut groups = self.groups.write().await;
        let ledger = groups
            .get_mut(group_id)
            .ok_or_else(|| LedgerError::NotFound(format!("group {group_id}")))?;
        if ledger.version != version {
            return Err(LedgerError::Conflict(format!(
                "group {group_id} changed (expected version {version}, found {})",
                ledger.version
            )));
        }
        write(ledger);
        ledger.version += 1;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_group(&self, ledger: GroupLedger) -> LedgerResult<()> {
        let mut groups = self.groups.write().await;
        if groups.contains_key(&ledger.group.id) {
            return Err(LedgerError::Conflict(format!(
                "group {} already exists",
                ledger.group.id
            )));
        }
        groups.insert(ledger.group.id.clone(), ledger);
        Ok(())
    }

    async fn load(&self, group_id: &str) -> LedgerResult<GroupLedger> {
        self.groups
            .read()
            .await
            .get(group_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("group {group_id}")))
    }

    async fn groups_for_member(&self, member_id: &str) -> LedgerResult<Vec<Group>> {
        let mut groups: Vec<Group> = self
            .groups
            .read()
            .await
            .values()
            .filter(|ledger| ledger.group.is_member(member_id))
            .map(|ledger| ledger.group.clone())
            .collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn add_member(&self, group_id: &str, version: i64, member: Member) -> LedgerResult<()> {
        self.write_at(group_id, version, |ledger| ledger.group.members.push(member))
            .await
    }

    async fn append_expense(
        &self,
        group_id: &str,
        version: i64,
        expense: Expense,
    ) -> LedgerResult<()> {
        self.write_at(group_id, version, |ledger| ledger.expenses.push(expense))
            .await
    }

    async fn append_payment(
        &self,
        group_id: &str,
        version: i64,
        payment: Payment,
    ) -> LedgerResult<()> {
        self.write_at(group_id, version, |ledger| ledger.payments.push(payment))
            .await
    }

    async fn delete_group(&self, group_id: &str) -> LedgerResult<()> {
        self.groups
            .write()
            .await
            .remove(group_id)
            .map(|_| ())
            .ok_or_else(|| LedgerError::NotFound(format!("group {group_id}")))
    }
}
