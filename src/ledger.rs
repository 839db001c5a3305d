//! The ledger service: the operations callers use to manage groups, log
//! expenses and payments, and read balances and settlement plans.
//!
//! Writes to one group are serialized through a per-group lock and carry the
//! version of the snapshot they were validated against, so an accepted write
//! never breaks the zero-sum property of the group's balances. Reads work on
//! a snapshot and never block on writers of other groups.
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::balance::{apply_expense, apply_payment, compute_balance_from_group, Balance};
use crate::error::{LedgerError, LedgerResult};
use crate::exchange::{get_exchanges_from_balance, Exchange};
use crate::schemas::{
    Amount, Category, Expense, ExpenseFilter, Group, GroupId, GroupLedger, Member, MemberId,
    Payment, PaymentMethod, SplitRule,
};
use crate::split::{check_shares, resolve};
use crate::store::LedgerStore;

#[derive(Clone, Debug, Deserialize)]
pub struct NewExpense {
    pub payer: MemberId,
    pub amount: Amount,
    pub date: NaiveDate,
    pub description: String,
    #[serde(default)]
    pub category: Category,
    pub split: SplitRule,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewPayment {
    pub payer: MemberId,
    pub payee: MemberId,
    pub amount: Amount,
    pub date: NaiveDate,
    #[serde(default)]
    pub method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

type GroupLock = Arc<tokio::sync::Mutex<()>>;

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    locks: Mutex<HashMap<GroupId, GroupLock>>,
}

fn required(value: &str, what: &str) -> LedgerResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LedgerError::Validation(format!("{what} must not be empty")));
    }
    Ok(value.to_string())
}

fn ensure_member(ledger: &GroupLedger, member: &str) -> LedgerResult<()> {
    if !ledger.group.is_member(member) {
        return Err(LedgerError::Validation(format!(
            "{member} is not a member of group {}",
            ledger.group.id
        )));
    }
    Ok(())
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Ledger {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock for writers of one group. Only groups found in the store get an
    /// entry, so writes aimed at unknown ids leave the map alone.
    async fn group_lock(&self, group_id: &str) -> LedgerResult<GroupLock> {
        let existing = {
            let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.get(group_id).cloned()
        };
        if let Some(lock) = existing {
            return Ok(lock);
        }
        self.store.load(group_id).await?;
        Ok(self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(group_id.to_string())
            .or_default()
            .clone())
    }

    #[tracing::instrument(skip(self, owner), fields(owner = %owner.id))]
    pub async fn create_group(&self, name: &str, owner: Member) -> LedgerResult<Group> {
        let name = required(name, "group name")?;
        let owner = Member {
            id: required(&owner.id, "member id")?,
            name: required(&owner.name, "member name")?,
        };
        let group = Group {
            id: Uuid::new_v4().to_string(),
            name,
            owner: owner.id.clone(),
            members: vec![owner],
            created_at: Utc::now(),
        };
        self.store.insert_group(GroupLedger::new(group.clone())).await?;
        tracing::info!(group = %group.id, "group created");
        Ok(group)
    }

    /// Full snapshot of a group and its history.
    pub async fn snapshot(&self, group_id: &str) -> LedgerResult<GroupLedger> {
        self.store.load(group_id).await
    }

    /// Snapshot of a group the given member belongs to.
    pub async fn snapshot_for(&self, group_id: &str, member: &str) -> LedgerResult<GroupLedger> {
        let ledger = self.snapshot(group_id).await?;
        if !ledger.group.is_member(member) {
            tracing::warn!(group = group_id, member, "access by non-member refused");
            return Err(LedgerError::Forbidden(format!(
                "{member} is not a member of group {group_id}"
            )));
        }
        Ok(ledger)
    }

    pub async fn get_group(&self, group_id: &str) -> LedgerResult<Group> {
        Ok(self.snapshot(group_id).await?.group)
    }

    pub async fn groups_for_member(&self, member: &str) -> LedgerResult<Vec<Group>> {
        tracing::debug!(member, "listing groups");
        self.store.groups_for_member(member).await
    }

    #[tracing::instrument(skip(self, member), fields(member = %member.id))]
    pub async fn add_member(&self, group_id: &str, member: Member) -> LedgerResult<Group> {
        let member = Member {
            id: required(&member.id, "member id")?,
            name: required(&member.name, "member name")?,
        };
        let lock = self.group_lock(group_id).await?;
        let _guard = lock.lock().await;

        let mut ledger = self.store.load(group_id).await?;
        if ledger.group.is_member(&member.id) {
            return Err(LedgerError::Conflict(format!(
                "{} is already a member of group {group_id}",
                member.id
            )));
        }
        self.store
            .add_member(group_id, ledger.version, member.clone())
            .await?;
        tracing::info!("member added");
        ledger.group.members.push(member);
        Ok(ledger.group)
    }

    /// Validates and appends an expense. Shares are resolved here once and
    /// stored with the expense.
    #[tracing::instrument(skip(self, expense), fields(payer = %expense.payer, amount = expense.amount))]
    pub async fn add_expense(&self, group_id: &str, expense: NewExpense) -> LedgerResult<Expense> {
        let description = required(&expense.description, "description")?;
        let shares = resolve(expense.amount, &expense.split)?;

        let lock = self.group_lock(group_id).await?;
        let _guard = lock.lock().await;

        let ledger = self.store.load(group_id).await?;
        ensure_member(&ledger, &expense.payer)?;
        for participant in shares.keys() {
            ensure_member(&ledger, participant)?;
        }
        check_shares(expense.amount, &shares)?;

        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            group: group_id.to_string(),
            payer: expense.payer,
            amount: expense.amount,
            date: expense.date,
            description,
            category: expense.category,
            rule: expense.split,
            shares,
            notes: expense.notes,
            created_at: Utc::now(),
        };
        let mut balance = compute_balance_from_group(&ledger)?;
        apply_expense(&mut balance, &expense)?;
        self.store
            .append_expense(group_id, ledger.version, expense.clone())
            .await?;
        tracing::info!(expense = %expense.id, "expense added");
        Ok(expense)
    }

    /// Appends a payment from `payer` to `payee`. Balances pick it up on the
    /// next recomputation.
    #[tracing::instrument(skip(self, payment), fields(payer = %payment.payer, payee = %payment.payee))]
    pub async fn record_payment(&self, group_id: &str, payment: NewPayment) -> LedgerResult<Payment> {
        if payment.payer == payment.payee {
            return Err(LedgerError::Validation(
                "payer and payee must be different members".to_string(),
            ));
        }
        if payment.amount <= 0 {
            return Err(LedgerError::Validation(format!(
                "payment amount must be positive, got {}",
                payment.amount
            )));
        }

        let lock = self.group_lock(group_id).await?;
        let _guard = lock.lock().await;

        let ledger = self.store.load(group_id).await?;
        ensure_member(&ledger, &payment.payer)?;
        ensure_member(&ledger, &payment.payee)?;

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            group: group_id.to_string(),
            payer: payment.payer,
            payee: payment.payee,
            amount: payment.amount,
            date: payment.date,
            method: payment.method,
            notes: payment.notes,
            created_at: Utc::now(),
        };
        let mut balance = compute_balance_from_group(&ledger)?;
        apply_payment(&mut balance, &payment)?;
        self.store
            .append_payment(group_id, ledger.version, payment.clone())
            .await?;
        tracing::info!(payment = %payment.id, "payment recorded");
        Ok(payment)
    }

    /// Expenses ordered by date, then insertion.
    pub async fn list_expenses(&self, group_id: &str) -> LedgerResult<Vec<Expense>> {
        self.search_expenses(group_id, &ExpenseFilter::default()).await
    }

    /// Expenses matching `filter`, in the same order as [`Ledger::list_expenses`].
    pub async fn search_expenses(
        &self,
        group_id: &str,
        filter: &ExpenseFilter,
    ) -> LedgerResult<Vec<Expense>> {
        let ledger = self.snapshot(group_id).await?;
        Ok(ledger.filtered_expenses(filter).into_iter().cloned().collect())
    }

    /// Payments ordered by date, then insertion.
    pub async fn list_payments(&self, group_id: &str) -> LedgerResult<Vec<Payment>> {
        let ledger = self.snapshot(group_id).await?;
        Ok(ledger.payments_by_date().into_iter().cloned().collect())
    }

    pub async fn net_balances(&self, group_id: &str) -> LedgerResult<Balance> {
        tracing::debug!(group = group_id, "computing balances");
        compute_balance_from_group(&self.snapshot(group_id).await?)
    }

    pub async fn settlement_plan(&self, group_id: &str) -> LedgerResult<Vec<Exchange>> {
        let balance = self.net_balances(group_id).await?;
        Ok(get_exchanges_from_balance(&balance))
    }

    /// Deletes the group along with its expenses and payments.
    #[tracing::instrument(skip(self))]
    pub async fn delete_group(&self, group_id: &str) -> LedgerResult<()> {
        let lock = self.group_lock(group_id).await?;
        let _guard = lock.lock().await;

        self.store.delete_group(group_id).await?;
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(group_id);
        tracing::info!("group deleted");
        Ok(())
    }
}
