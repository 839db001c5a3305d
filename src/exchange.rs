use crate::balance::Balance;
use crate::schemas::{Amount, MemberId};
use serde::{Deserialize, Serialize};
use std::cmp::{min, Reverse};
use std::collections::BinaryHeap;

/// One transfer of a settlement plan: `from` pays `amount` to `to`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Exchange {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Amount,
}

/// Heap entry: largest outstanding amount first, then ascending member id.
type Position = (Amount, Reverse<MemberId>);

/// Turns net balances into transfers that bring every balance to zero.
///
/// Greedy matching: the largest debtor pays the largest creditor
/// `min(debt, credit)` and whoever still has something outstanding goes
/// back into the queue. This is not always the fewest possible transfers
/// but it is deterministic and needs at most `members - 1` of them.
pub fn get_exchanges_from_balance(balance: &Balance) -> Vec<Exchange> {
    let mut payers: BinaryHeap<Position> = BinaryHeap::new();
    let mut receivers: BinaryHeap<Position> = BinaryHeap::new();

    for (id, amount) in balance {
        if *amount < 0 {
            payers.push((-amount, Reverse(id.clone())));
        } else if *amount > 0 {
            receivers.push((*amount, Reverse(id.clone())));
        }
    }

    let mut exchanges = Vec::new();
    while let (Some((debt, Reverse(payer))), Some((credit, Reverse(receiver)))) =
        (payers.pop(), receivers.pop())
    {
        let amount = min(debt, credit);
        if debt > amount {
            payers.push((debt - amount, Reverse(payer.clone())));
        }
        if credit > amount {
            receivers.push((credit - amount, Reverse(receiver.clone())));
        }
        exchanges.push(Exchange {
            from: payer,
            to: receiver,
            amount,
        });
    }

    if !payers.is_empty() || !receivers.is_empty() {
        tracing::error!(
            payers = payers.len(),
            receivers = receivers.len(),
            "balances left unsettled"
        );
    }
    exchanges
}
