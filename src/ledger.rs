use std::collections::{BTreeMap, BTreeSet};

use crate::error::LedgerError;
use crate::schemas::{ExpenseRecord, Group, GroupId, WalletAddress};
use crate::split::sums_match;

/// Two users stored in alphabetical order, so every expense between the same
/// two people lands on the same key regardless of who paid.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserPair {
    pub user1: WalletAddress,
    pub user2: WalletAddress,
}

impl UserPair {
    /// Builds the key for "`debtor` owes `creditor`" and returns the sign the
    /// debt carries under that key: `1.0` when user1 owes user2, `-1.0` otherwise.
    pub fn for_debt(debtor: &str, creditor: &str) -> (Self, f64) {
        if debtor <= creditor {
            (
                UserPair {
                    user1: debtor.to_string(),
                    user2: creditor.to_string(),
                },
                1.0,
            )
        } else {
            (
                UserPair {
                    user1: creditor.to_string(),
                    user2: debtor.to_string(),
                },
                -1.0,
            )
        }
    }
}

/// Running signed total for one pair. Positive means user1 owes user2.
#[derive(Clone, Debug, PartialEq)]
pub struct PairAccumulator {
    pub total: f64,
    pub group_id: GroupId,
    pub group_name: String,
}

pub type Accumulators = BTreeMap<UserPair, PairAccumulator>;

/// Whose debts get folded into the accumulators.
#[derive(Clone, Copy, Debug)]
enum View<'a> {
    /// Only debts where the given address is the debtor or the creditor.
    Member(&'a str),
    /// Every debt between any two participants.
    Everyone,
}

/// Folds the expenses visible to `identity` into one running total per
/// counterparty.
///
/// Only expenses of groups in `memberships` are considered, and only the splits
/// that make `identity` owe the payer or make someone owe `identity`.
pub fn aggregate(
    identity: &str,
    memberships: &[Group],
    records: &[ExpenseRecord],
) -> Result<Accumulators, LedgerError> {
    let visible: BTreeSet<&str> = memberships.iter().map(|group| group.id.as_str()).collect();
    let records: Vec<&ExpenseRecord> = records
        .iter()
        .filter(|record| visible.contains(record.expense.group_id.as_str()))
        .collect();
    fold(View::Member(identity), records)
}

/// Folds every debt between any two participants of the given expenses.
pub fn aggregate_group(records: &[ExpenseRecord]) -> Result<Accumulators, LedgerError> {
    fold(View::Everyone, records.iter().collect())
}

fn fold(view: View<'_>, mut records: Vec<&ExpenseRecord>) -> Result<Accumulators, LedgerError> {
    // The first group folded names a pair, so fold in a stable order.
    records.sort_by(|a, b| {
        (&a.expense.group_id, a.expense.created_at, &a.expense.id).cmp(&(
            &b.expense.group_id,
            b.expense.created_at,
            &b.expense.id,
        ))
    });

    let mut accumulators = Accumulators::new();
    for record in records {
        check_record(record)?;
        let paid_by = record.expense.paid_by.as_str();
        let group_name = record.group_name.as_deref().unwrap_or_default();

        for split in &record.splits {
            let debtor = split.wallet_address.as_str();
            if debtor == paid_by {
                continue;
            }
            if let View::Member(identity) = view {
                if debtor != identity && paid_by != identity {
                    continue;
                }
            }

            let (pair, sign) = UserPair::for_debt(debtor, paid_by);
            accumulators
                .entry(pair)
                .and_modify(|acc| acc.total += sign * split.amount)
                .or_insert_with(|| PairAccumulator {
                    total: sign * split.amount,
                    group_id: record.expense.group_id.clone(),
                    group_name: group_name.to_string(),
                });
        }
    }
    Ok(accumulators)
}

fn check_record(record: &ExpenseRecord) -> Result<(), LedgerError> {
    let expense = &record.expense;
    if !expense.amount.is_finite() || expense.amount <= 0.0 {
        return Err(LedgerError::LedgerData(format!(
            "expense {} has invalid amount {}",
            expense.id, expense.amount
        )));
    }
    if expense.paid_by.is_empty() {
        return Err(LedgerError::LedgerData(format!(
            "expense {} has no payer",
            expense.id
        )));
    }
    match record.group_name.as_deref() {
        Some(name) if !name.is_empty() => {}
        _ => {
            return Err(LedgerError::LedgerData(format!(
                "expense {} references unknown group {}",
                expense.id, expense.group_id
            )))
        }
    }

    let mut total = 0.0;
    for split in &record.splits {
        if split.expense_id != expense.id {
            return Err(LedgerError::LedgerData(format!(
                "split {} belongs to expense {}, not {}",
                split.id, split.expense_id, expense.id
            )));
        }
        if split.wallet_address.is_empty() || !split.amount.is_finite() || split.amount < 0.0 {
            return Err(LedgerError::LedgerData(format!(
                "split {} of expense {} is malformed",
                split.id, expense.id
            )));
        }
        total += split.amount;
    }
    if !record.splits.is_empty() && !sums_match(expense.amount, total) {
        return Err(LedgerError::LedgerData(format!(
            "splits of expense {} add up to {total}, expected {}",
            expense.id, expense.amount
        )));
    }
    Ok(())
}
