//! Spending summaries over a group's expenses.
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{Amount, Category, Expense, GroupLedger, MemberId};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub total: Amount,
    /// Share of the overall spending in percent.
    pub percent: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthTotal {
    /// `YYYY-MM`
    pub month: String,
    pub total: Amount,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Analytics {
    pub since: Option<NaiveDate>,
    pub total: Amount,
    pub expense_count: usize,
    pub categories: Vec<CategoryTotal>,
    pub months: Vec<MonthTotal>,
    /// What each member consumed, i.e. the sum of their shares.
    pub members: BTreeMap<MemberId, Amount>,
}

fn in_range<'a>(ledger: &'a GroupLedger, since: Option<NaiveDate>) -> impl Iterator<Item = &'a Expense> {
    ledger
        .expenses
        .iter()
        .filter(move |expense| since.map_or(true, |since| expense.date >= since))
}

fn accumulate(total: &mut Amount, amount: Amount) -> LedgerResult<()> {
    *total = total
        .checked_add(amount)
        .ok_or_else(|| LedgerError::Validation("spending total is out of range".to_string()))?;
    Ok(())
}

/// Totals per category, largest first.
pub fn category_breakdown(
    ledger: &GroupLedger,
    since: Option<NaiveDate>,
) -> LedgerResult<Vec<CategoryTotal>> {
    let mut totals: BTreeMap<Category, Amount> = BTreeMap::new();
    let mut overall: Amount = 0;
    for expense in in_range(ledger, since) {
        accumulate(totals.entry(expense.category).or_insert(0), expense.amount)?;
        accumulate(&mut overall, expense.amount)?;
    }
    let mut categories: Vec<CategoryTotal> = totals
        .into_iter()
        .map(|(category, total)| CategoryTotal {
            category,
            total,
            percent: if overall == 0 {
                0.0
            } else {
                total as f64 * 100.0 / overall as f64
            },
        })
        .collect();
    categories.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.category.cmp(&b.category)));
    Ok(categories)
}

/// Totals per calendar month, oldest first.
pub fn monthly_trend(ledger: &GroupLedger, since: Option<NaiveDate>) -> LedgerResult<Vec<MonthTotal>> {
    let mut totals: BTreeMap<(i32, u32), Amount> = BTreeMap::new();
    for expense in in_range(ledger, since) {
        let month = totals
            .entry((expense.date.year(), expense.date.month()))
            .or_insert(0);
        accumulate(month, expense.amount)?;
    }
    Ok(totals
        .into_iter()
        .map(|((year, month), total)| MonthTotal {
            month: format!("{year:04}-{month:02}"),
            total,
        })
        .collect())
}

pub fn member_spending(
    ledger: &GroupLedger,
    since: Option<NaiveDate>,
) -> LedgerResult<BTreeMap<MemberId, Amount>> {
    let mut spending: BTreeMap<MemberId, Amount> = ledger
        .group
        .members
        .iter()
        .map(|member| (member.id.clone(), 0))
        .collect();
    for expense in in_range(ledger, since) {
        for (member, share) in &expense.shares {
            accumulate(spending.entry(member.clone()).or_insert(0), *share)?;
        }
    }
    Ok(spending)
}

pub fn summarize(ledger: &GroupLedger, since: Option<NaiveDate>) -> LedgerResult<Analytics> {
    let mut total: Amount = 0;
    for expense in in_range(ledger, since) {
        accumulate(&mut total, expense.amount)?;
    }
    Ok(Analytics {
        since,
        total,
        expense_count: in_range(ledger, since).count(),
        categories: category_breakdown(ledger, since)?,
        months: monthly_trend(ledger, since)?,
        members: member_spending(ledger, since)?,
    })
}
