use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type MemberId = String;
pub type GroupId = String;
pub type ExpenseId = String;
pub type PaymentId = String;

/// Money in minor currency units (cents, paise, ...).
pub type Amount = i64;

/// Concrete share of an expense per participant, ordered by member id.
pub type Shares = BTreeMap<MemberId, Amount>;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Join order.
    pub members: Vec<Member>,
    pub owner: MemberId,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, id: &str) -> bool {
        self.members.iter().any(|member| member.id == id)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Category {
    Groceries,
    Dining,
    Utilities,
    Rent,
    Transportation,
    Entertainment,
    Travel,
    Shopping,
    Healthcare,
    Education,
    Other,
    #[default]
    Uncategorized,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Groceries => "Groceries",
            Category::Dining => "Dining",
            Category::Utilities => "Utilities",
            Category::Rent => "Rent",
            Category::Transportation => "Transportation",
            Category::Entertainment => "Entertainment",
            Category::Travel => "Travel",
            Category::Shopping => "Shopping",
            Category::Healthcare => "Healthcare",
            Category::Education => "Education",
            Category::Other => "Other",
            Category::Uncategorized => "Uncategorized",
        }
    }
}

/// How an expense total is divided among participants.
///
/// The rule is kept on the expense for reference only; the resolved
/// [`Shares`] are what balances are computed from.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitRule {
    Equal { participants: Vec<MemberId> },
    Exact { amounts: BTreeMap<MemberId, Amount> },
    Percentage { percents: BTreeMap<MemberId, f64> },
}

impl SplitRule {
    pub fn participants(&self) -> Vec<&MemberId> {
        match self {
            SplitRule::Equal { participants } => participants.iter().collect(),
            SplitRule::Exact { amounts } => amounts.keys().collect(),
            SplitRule::Percentage { percents } => percents.keys().collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub group: GroupId,
    pub payer: MemberId,
    pub amount: Amount,
    pub date: NaiveDate,
    pub description: String,
    #[serde(default)]
    pub category: Category,
    pub rule: SplitRule,
    pub shares: Shares,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Upi,
    Paypal,
    Bank,
    Cash,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub group: GroupId,
    pub payer: MemberId,
    pub payee: MemberId,
    pub amount: Amount,
    pub date: NaiveDate,
    #[serde(default)]
    pub method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Narrows an expense listing. `q` matches the description, the payer id or
/// the payer name, ignoring case; `since` keeps expenses on or after a date.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ExpenseFilter {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub since: Option<NaiveDate>,
}

impl ExpenseFilter {
    pub fn matches(&self, group: &Group, expense: &Expense) -> bool {
        if self.since.is_some_and(|since| expense.date < since) {
            return false;
        }
        let needle = match self.q.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => q.to_lowercase(),
            _ => return true,
        };
        let payer_name = group
            .members
            .iter()
            .find(|member| member.id == expense.payer)
            .map(|member| member.name.as_str())
            .unwrap_or_default();
        [expense.description.as_str(), expense.payer.as_str(), payer_name]
            .iter()
            .any(|text| text.to_lowercase().contains(&needle))
    }
}

/// Everything stored for one group: the group itself and its append-only
/// history. `version` increases by one on every accepted write.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GroupLedger {
    pub group: Group,
    pub expenses: Vec<Expense>,
    pub payments: Vec<Payment>,
    pub version: i64,
}

impl GroupLedger {
    pub fn new(group: Group) -> Self {
        GroupLedger {
            group,
            expenses: vec![],
            payments: vec![],
            version: 0,
        }
    }

    /// Expenses ordered by date, ties kept in insertion order.
    pub fn expenses_by_date(&self) -> Vec<&Expense> {
        let mut expenses: Vec<&Expense> = self.expenses.iter().collect();
        expenses.sort_by_key(|expense| expense.date);
        expenses
    }

    /// Payments ordered by date, ties kept in insertion order.
    pub fn payments_by_date(&self) -> Vec<&Payment> {
        let mut payments: Vec<&Payment> = self.payments.iter().collect();
        payments.sort_by_key(|payment| payment.date);
        payments
    }

    /// [`GroupLedger::expenses_by_date`] narrowed by `filter`.
    pub fn filtered_expenses(&self, filter: &ExpenseFilter) -> Vec<&Expense> {
        self.expenses_by_date()
            .into_iter()
            .filter(|expense| filter.matches(&self.group, expense))
            .collect()
    }
}
