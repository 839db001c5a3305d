use std::collections::BTreeMap;

use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{Amount, Expense, GroupLedger, MemberId, Payment};

/// Net position per member: positive means the group owes them money.
pub type Balance = BTreeMap<MemberId, Amount>;

/// Replays the whole history of a group into net balances.
///
/// Every member of the group shows up, even with a zero balance. Fails if a
/// balance leaves the range of [`Amount`].
pub fn compute_balance_from_group(ledger: &GroupLedger) -> LedgerResult<Balance> {
    let mut balance: Balance = ledger
        .group
        .members
        .iter()
        .map(|member| (member.id.clone(), 0))
        .collect();
    for expense in &ledger.expenses {
        apply_expense(&mut balance, expense)?;
    }
    for payment in &ledger.payments {
        apply_payment(&mut balance, payment)?;
    }
    check_conservation(&balance);
    Ok(balance)
}

pub fn apply_expense(balance: &mut Balance, expense: &Expense) -> LedgerResult<()> {
    adjust(balance, &expense.payer, |current| current.checked_add(expense.amount))?;
    for (participant, share) in &expense.shares {
        adjust(balance, participant, |current| current.checked_sub(*share))?;
    }
    Ok(())
}

/// A payment discharges debt from the payer towards the payee.
pub fn apply_payment(balance: &mut Balance, payment: &Payment) -> LedgerResult<()> {
    adjust(balance, &payment.payer, |current| current.checked_add(payment.amount))?;
    adjust(balance, &payment.payee, |current| current.checked_sub(payment.amount))
}

/// `Amount::MIN` is refused as well so every balance can be negated.
fn adjust(
    balance: &mut Balance,
    member: &MemberId,
    change: impl FnOnce(Amount) -> Option<Amount>,
) -> LedgerResult<()> {
    let current = balance.entry(member.clone()).or_insert(0);
    *current = change(*current)
        .filter(|amount| *amount != Amount::MIN)
        .ok_or_else(|| {
            LedgerError::Validation(format!("balance of {member} would overflow"))
        })?;
    Ok(())
}

/// Balances of a group always sum to zero; anything else is a bug in
/// write-time validation.
fn check_conservation(balance: &Balance) {
    let sum: i128 = balance.values().map(|amount| i128::from(*amount)).sum();
    if sum != 0 {
        tracing::error!(sum = %sum, "group balances do not sum to zero");
    }
    debug_assert_eq!(sum, 0, "group balances must sum to zero");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{Category, Group, Member, PaymentMethod, SplitRule};
    use crate::split::resolve;
    use chrono::{NaiveDate, Utc};

    fn ledger(members: &[&str]) -> GroupLedger {
        GroupLedger::new(Group {
            id: "g".to_string(),
            name: "Trip".to_string(),
            members: members
                .iter()
                .map(|id| Member {
                    id: id.to_string(),
                    name: id.to_uppercase(),
                })
                .collect(),
            owner: members[0].to_string(),
            created_at: Utc::now(),
        })
    }

    fn expense(payer: &str, amount: Amount, rule: SplitRule) -> Expense {
        Expense {
            id: format!("e-{payer}-{amount}"),
            group: "g".to_string(),
            payer: payer.to_string(),
            amount,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            description: "dinner".to_string(),
            category: Category::Dining,
            shares: resolve(amount, &rule).unwrap(),
            rule,
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn payment(payer: &str, payee: &str, amount: Amount) -> Payment {
        Payment {
            id: format!("p-{payer}-{payee}"),
            group: "g".to_string(),
            payer: payer.to_string(),
            payee: payee.to_string(),
            amount,
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            method: PaymentMethod::Cash,
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn equal(members: &[&str]) -> SplitRule {
        SplitRule::Equal {
            participants: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn payer_is_owed_everyone_elses_share() {
        let mut group = ledger(&["a", "b", "c"]);
        group.expenses.push(expense("a", 90, equal(&["a", "b", "c"])));

        let balance = compute_balance_from_group(&group).unwrap();
        assert_eq!(balance["a"], 60);
        assert_eq!(balance["b"], -30);
        assert_eq!(balance["c"], -30);
    }

    #[test]
    fn members_without_activity_are_zero() {
        let mut group = ledger(&["a", "b", "c"]);
        group.expenses.push(expense("a", 50, equal(&["a", "b"])));

        let balance = compute_balance_from_group(&group).unwrap();
        assert_eq!(balance["c"], 0);
        assert_eq!(balance.len(), 3);
    }

    #[test]
    fn payments_discharge_debt() {
        let mut group = ledger(&["a", "b", "c"]);
        group.expenses.push(expense("a", 90, equal(&["a", "b", "c"])));
        group.payments.push(payment("b", "a", 30));

        let balance = compute_balance_from_group(&group).unwrap();
        assert_eq!(balance["a"], 30);
        assert_eq!(balance["b"], 0);
        assert_eq!(balance["c"], -30);
    }

    #[test]
    fn payer_outside_the_split_is_owed_everything() {
        let mut group = ledger(&["a", "b", "c"]);
        group.expenses.push(expense("c", 100, equal(&["a", "b"])));

        let balance = compute_balance_from_group(&group).unwrap();
        assert_eq!(balance["c"], 100);
        assert_eq!(balance["a"], -50);
        assert_eq!(balance["b"], -50);
    }

    #[test]
    fn balances_sum_to_zero_over_long_histories() {
        let members = ["a", "b", "c", "d", "e"];
        let mut group = ledger(&members);
        for step in 0..200_i64 {
            let payer = members[(step % 5) as usize];
            let amount = (step * 7919) % 10_007;
            let rule = match step % 3 {
                0 => equal(&members[..(step % 4 + 2) as usize]),
                1 => SplitRule::Percentage {
                    percents: [("a", 12.5), ("c", 37.5), ("e", 50.0)]
                        .iter()
                        .map(|(id, pct)| (id.to_string(), *pct))
                        .collect(),
                },
                _ => SplitRule::Exact {
                    amounts: [("b".to_string(), amount / 2), ("d".to_string(), amount - amount / 2)]
                        .into_iter()
                        .collect(),
                },
            };
            group.expenses.push(expense(payer, amount, rule));
            if step % 11 == 0 {
                group.payments.push(payment(members[(step % 4) as usize], "e", step + 1));
            }

            let balance = compute_balance_from_group(&group).unwrap();
            assert_eq!(balance.values().sum::<Amount>(), 0);
        }
    }

    #[test]
    fn recomputing_is_idempotent() {
        let mut group = ledger(&["a", "b"]);
        group.expenses.push(expense("b", 33, equal(&["a", "b"])));
        group.payments.push(payment("a", "b", 5));

        assert_eq!(
            compute_balance_from_group(&group).unwrap(),
            compute_balance_from_group(&group).unwrap()
        );
    }

    #[test]
    fn overflowing_history_is_an_error() {
        let mut group = ledger(&["a", "b"]);
        group.expenses.push(expense("a", Amount::MAX, equal(&["b"])));
        assert_eq!(compute_balance_from_group(&group).unwrap()["a"], Amount::MAX);

        group.expenses.push(expense("a", Amount::MAX, equal(&["b"])));
        assert!(matches!(
            compute_balance_from_group(&group),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn minimum_amount_is_refused() {
        let mut group = ledger(&["a", "b"]);
        group.expenses.push(expense("a", Amount::MAX, equal(&["b"])));
        group.payments.push(payment("a", "b", 1));
        assert!(matches!(
            compute_balance_from_group(&group),
            Err(LedgerError::Validation(_))
        ));
    }
}
