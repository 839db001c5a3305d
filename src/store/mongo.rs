use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, Collection, IndexModel,
};

use super::LedgerStore;
use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{Expense, Group, GroupLedger, Member, Payment};

const GROUPS: &str = "Groups";
const DUPLICATE_KEY: i32 = 11000;

/// One MongoDB document per group holding the group and its whole history,
/// so a single read is always a consistent snapshot.
pub struct MongoStore {
    groups: Collection<GroupLedger>,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> LedgerResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let groups = client.database(database).collection::<GroupLedger>(GROUPS);
        let index = IndexModel::builder()
            .keys(doc! { "group.id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        groups.create_index(index, None).await?;
        tracing::info!(database, "connected to MongoDB");
        Ok(MongoStore { groups })
    }

    /// Applies `update` only if the stored version still matches, bumping it.
    async fn write_at(&self, group_id: &str, version: i64, mut update: Document) -> LedgerResult<()> {
        update.insert("$inc", doc! { "version": 1_i64 });
        let result = self
            .groups
            .update_one(doc! { "group.id": group_id, "version": version }, update, None)
            .await?;
        if result.matched_count == 1 {
            return Ok(());
        }
        match self.groups.find_one(doc! { "group.id": group_id }, None).await? {
            Some(current) => Err(LedgerError::Conflict(format!(
                "group {group_id} changed (expected version {version}, found {})",
                current.version
            ))),
            None => Err(LedgerError::NotFound(format!("group {group_id}"))),
        }
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl LedgerStore for MongoStore {
    async fn insert_group(&self, ledger: GroupLedger) -> LedgerResult<()> {
        let id = ledger.group.id.clone();
        match self.groups.insert_one(ledger, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                Err(LedgerError::Conflict(format!("group {id} already exists")))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn load(&self, group_id: &str) -> LedgerResult<GroupLedger> {
        self.groups
            .find_one(doc! { "group.id": group_id }, None)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("group {group_id}")))
    }

    async fn groups_for_member(&self, member_id: &str) -> LedgerResult<Vec<Group>> {
        let ledgers: Vec<GroupLedger> = self
            .groups
            .find(doc! { "group.members.id": member_id }, None)
            .await?
            .try_collect()
            .await?;
        let mut groups: Vec<Group> = ledgers.into_iter().map(|ledger| ledger.group).collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn add_member(&self, group_id: &str, version: i64, member: Member) -> LedgerResult<()> {
        let member = bson::to_bson(&member)?;
        self.write_at(group_id, version, doc! { "$push": { "group.members": member } })
            .await
    }

    async fn append_expense(
        &self,
        group_id: &str,
        version: i64,
        expense: Expense,
    ) -> LedgerResult<()> {
        let expense = bson::to_bson(&expense)?;
        self.write_at(group_id, version, doc! { "$push": { "expenses": expense } })
            .await
    }

    async fn append_payment(
        &self,
        group_id: &str,
        version: i64,
        payment: Payment,
    ) -> LedgerResult<()> {
        let payment = bson::to_bson(&payment)?;
        self.write_at(group_id, version, doc! { "$push": { "payments": payment } })
            .await
    }

    async fn delete_group(&self, group_id: &str) -> LedgerResult<()> {
        let result = self
            .groups
            .delete_one(doc! { "group.id": group_id }, None)
            .await?;
        if result.deleted_count == 0 {
            return Err(LedgerError::NotFound(format!("group {group_id}")));
        }
        Ok(())
    }
}
