use serde::{Deserialize, Serialize};

use crate::ledger::Accumulators;
use crate::schemas::{GroupId, WalletAddress};

/// Totals closer to zero than this count as settled.
pub const SETTLED_EPSILON: f64 = 1e-9;

/// A directed debt: `debtor` owes `creditor` a strictly positive `amount`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Balance {
    pub debtor: WalletAddress,
    pub creditor: WalletAddress,
    pub amount: f64,
    pub group_id: GroupId,
    pub group_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BalanceSummary {
    pub owed_to_you: f64,
    pub you_owe: f64,
    pub net: f64,
}

pub fn resolve(accumulators: &Accumulators) -> Vec<Balance> {
    accumulators
        .iter()
        .filter(|(_, acc)| acc.total.abs() > SETTLED_EPSILON)
        .map(|(pair, acc)| {
            // Positive totals mean user1 owes user2; negative ones flip the direction
            let (debtor, creditor) = if acc.total > 0.0 {
                (&pair.user1, &pair.user2)
            } else {
                (&pair.user2, &pair.user1)
            };
            Balance {
                debtor: debtor.clone(),
                creditor: creditor.clone(),
                amount: acc.total.abs(),
                group_id: acc.group_id.clone(),
                group_name: acc.group_name.clone(),
            }
        })
        .collect()
}

pub fn summarize(identity: &str, balances: &[Balance]) -> BalanceSummary {
    let mut summary = BalanceSummary::default();
    for balance in balances {
        if balance.creditor == identity {
            summary.owed_to_you += balance.amount;
        } else if balance.debtor == identity {
            summary.you_owe += balance.amount;
        }
    }
    summary.net = summary.owed_to_you - summary.you_owe;
    summary
}
