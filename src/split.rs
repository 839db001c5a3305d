use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{Amount, MemberId, Shares, SplitRule};
use std::collections::BTreeSet;

const PERCENT_TOLERANCE: f64 = 0.01;

/// Turns a split rule into the concrete share of every participant.
///
/// Participants are processed in ascending member id order and the last one
/// absorbs whatever integer division or rounding left over, so the shares
/// always add up to `total` exactly.
pub fn resolve(total: Amount, rule: &SplitRule) -> LedgerResult<Shares> {
    if total < 0 {
        return Err(LedgerError::Validation(format!(
            "expense amount must not be negative, got {total}"
        )));
    }
    let shares = match rule {
        SplitRule::Equal { participants } => resolve_equal(total, participants)?,
        SplitRule::Exact { amounts } => {
            if amounts.is_empty() {
                return Err(no_participants());
            }
            if let Some((member, amount)) = amounts.iter().find(|(_, amount)| **amount < 0) {
                return Err(LedgerError::Validation(format!(
                    "share of {member} must not be negative, got {amount}"
                )));
            }
            amounts.clone()
        }
        SplitRule::Percentage { percents } => resolve_percentage(total, percents)?,
    };
    check_shares(total, &shares)?;
    Ok(shares)
}

/// Fails unless `shares` add up to `total` exactly.
pub fn check_shares(total: Amount, shares: &Shares) -> LedgerResult<()> {
    let sum = shares
        .values()
        .try_fold(0 as Amount, |acc, share| acc.checked_add(*share))
        .ok_or_else(|| LedgerError::Validation("shares overflow".to_string()))?;
    if sum != total {
        return Err(LedgerError::Validation(format!(
            "shares add up to {sum} but the expense amount is {total}"
        )));
    }
    Ok(())
}

fn no_participants() -> LedgerError {
    LedgerError::Validation("a split needs at least one participant".to_string())
}

fn resolve_equal(total: Amount, participants: &[MemberId]) -> LedgerResult<Shares> {
    let ordered: BTreeSet<&MemberId> = participants.iter().collect();
    if ordered.is_empty() {
        return Err(no_participants());
    }
    if ordered.len() != participants.len() {
        return Err(LedgerError::Validation(
            "a participant is listed more than once".to_string(),
        ));
    }

    let count = ordered.len() as Amount;
    let base = total / count;
    let mut shares = Shares::new();
    for (index, member) in ordered.into_iter().enumerate() {
        let share = if index as Amount == count - 1 {
            total - base * (count - 1)
        } else {
            base
        };
        shares.insert(member.clone(), share);
    }
    Ok(shares)
}

fn resolve_percentage(
    total: Amount,
    percents: &std::collections::BTreeMap<MemberId, f64>,
) -> LedgerResult<Shares> {
    if percents.is_empty() {
        return Err(no_participants());
    }
    if let Some((member, percent)) = percents
        .iter()
        .find(|(_, percent)| !percent.is_finite() || **percent < 0.0)
    {
        return Err(LedgerError::Validation(format!(
            "percentage of {member} must be a non-negative number, got {percent}"
        )));
    }
    let sum: f64 = percents.values().sum();
    if (sum - 100.0).abs() > PERCENT_TOLERANCE + f64::EPSILON * 100.0 {
        return Err(LedgerError::Validation(format!(
            "percentages must add up to 100, got {sum}"
        )));
    }

    let mut shares = Shares::new();
    let mut assigned: Amount = 0;
    let last = percents.len() - 1;
    for (index, (member, percent)) in percents.iter().enumerate() {
        let remaining = total - assigned;
        let share = if index == last {
            remaining
        } else {
            // Rounding up several times can overshoot the total.
            ((total as f64 * percent / 100.0).round() as Amount).min(remaining)
        };
        assigned += share;
        shares.insert(member.clone(), share);
    }
    Ok(shares)
}
