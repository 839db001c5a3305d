use serde::Serialize;

use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{Amount, ExpenseFilter, GroupLedger};

const HEADER: [&str; 7] = [
    "date",
    "description",
    "group",
    "category",
    "paid_by",
    "amount",
    "your_share",
];

#[derive(Serialize)]
struct ReportRow<'a> {
    date: String,
    description: &'a str,
    group: &'a str,
    category: &'static str,
    paid_by: &'a str,
    amount: Amount,
    your_share: Amount,
}

fn csv_error(err: csv::Error) -> LedgerError {
    LedgerError::Storage(format!("failed to write report: {err}"))
}

/// Renders a group's expenses as CSV, oldest first, as seen by `viewer`:
/// `your_share` is the viewer's share of each expense, 0 when not a
/// participant. The header row is written even when nothing matches.
pub fn expenses_csv(ledger: &GroupLedger, viewer: &str, filter: &ExpenseFilter) -> LedgerResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(HEADER).map_err(csv_error)?;
    for expense in ledger.filtered_expenses(filter) {
        let paid_by = ledger
            .group
            .members
            .iter()
            .find(|member| member.id == expense.payer)
            .map_or(expense.payer.as_str(), |member| member.name.as_str());
        writer
            .serialize(ReportRow {
                date: expense.date.format("%Y-%m-%d").to_string(),
                description: &expense.description,
                group: &ledger.group.name,
                category: expense.category.as_str(),
                paid_by,
                amount: expense.amount,
                your_share: expense.shares.get(viewer).copied().unwrap_or(0),
            })
            .map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|err| LedgerError::Storage(format!("failed to finalize report: {err}")))
}
