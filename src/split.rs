use std::collections::{BTreeMap, BTreeSet};

use crate::error::ValidationError;
use crate::schemas::{SplitMethod, WalletAddress};

/// Amounts are split in millionths of a unit, the smallest ALGO denomination.
const UNITS_PER_COIN: f64 = 1_000_000.0;

/// Largest difference tolerated between a custom split sum and the expense amount.
pub const SPLIT_TOLERANCE: f64 = 1e-6;

/// Largest amount whose micro-unit count is still an exact integer in an `f64`.
pub const MAX_AMOUNT: f64 = 9_007_199_254.740_991;

/// Whether a split total matches the expense amount, allowing for `f64`
/// rounding at large magnitudes.
pub fn sums_match(expected: f64, actual: f64) -> bool {
    let tolerance = SPLIT_TOLERANCE.max(expected.abs() * f64::EPSILON * 64.0);
    (actual - expected).abs() <= tolerance
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShareOwed {
    pub wallet_address: WalletAddress,
    pub amount: f64,
}

/// Computes what each participant owes for an expense.
///
/// Equal splits distribute any indivisible remainder one micro-unit at a time to
/// participants in address order, so the shares always add up to `amount`.
/// Custom splits must name every participant and add up to `amount`.
pub fn compute_splits(
    amount: f64,
    method: SplitMethod,
    participants: &[WalletAddress],
    custom_amounts: Option<&BTreeMap<WalletAddress, f64>>,
) -> Result<Vec<ShareOwed>, ValidationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    if amount > MAX_AMOUNT {
        return Err(ValidationError::AmountTooLarge(amount));
    }
    if participants.iter().any(|p| p.trim().is_empty()) {
        return Err(ValidationError::EmptyIdentity);
    }
    let participants: BTreeSet<&WalletAddress> = participants.iter().collect();
    if participants.is_empty() {
        return Err(ValidationError::NoParticipants);
    }

    match method {
        SplitMethod::Equal => Ok(equal_shares(amount, &participants)),
        SplitMethod::Custom => {
            let custom = custom_amounts.ok_or(ValidationError::MissingCustomAmounts)?;
            custom_shares(amount, &participants, custom)
        }
    }
}

fn equal_shares(amount: f64, participants: &BTreeSet<&WalletAddress>) -> Vec<ShareOwed> {
    let total_units = (amount * UNITS_PER_COIN).round() as i64;
    let count = participants.len() as i64;
    let base = total_units / count;
    let remainder = (total_units % count) as usize;

    participants
        .iter()
        .enumerate()
        .map(|(index, address)| {
            let units = if index < remainder { base + 1 } else { base };
            ShareOwed {
                wallet_address: (*address).clone(),
                amount: units as f64 / UNITS_PER_COIN,
            }
        })
        .collect()
}

fn custom_shares(
    amount: f64,
    participants: &BTreeSet<&WalletAddress>,
    custom: &BTreeMap<WalletAddress, f64>,
) -> Result<Vec<ShareOwed>, ValidationError> {
    if let Some(stranger) = custom.keys().find(|address| !participants.contains(address)) {
        return Err(ValidationError::UnknownSplitParticipant(stranger.to_string()));
    }

    let mut shares = Vec::with_capacity(participants.len());
    for address in participants {
        let owed = *custom
            .get(*address)
            .ok_or_else(|| ValidationError::MissingCustomAmount((*address).clone()))?;
        if !owed.is_finite() || owed < 0.0 {
            return Err(ValidationError::InvalidCustomAmount {
                address: (*address).clone(),
                amount: owed,
            });
        }
        shares.push(ShareOwed {
            wallet_address: (*address).clone(),
            amount: owed,
        });
    }

    let actual: f64 = shares.iter().map(|share| share.amount).sum();
    if !sums_match(amount, actual) {
        return Err(ValidationError::SplitMismatch {
            expected: amount,
            actual,
        });
    }
    Ok(shares)
}
