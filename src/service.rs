use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use tracing::{info, warn};

use crate::balance::{resolve, Balance};
use crate::error::{LedgerError, ValidationError};
use crate::ledger::{aggregate, aggregate_group};
use crate::payment::PaymentRail;
use crate::schemas::{
    ExpenseRecord, GroupWithParticipants, NewExpense, NewExpenseSplit, NewParticipant,
    SplitMethod, WalletAddress,
};
use crate::session::Session;
use crate::settlement::Settlement;
use crate::split::compute_splits;
use crate::store::LedgerStore;

#[derive(Clone, Debug, Deserialize)]
pub struct NewGroupRequest {
    pub name: String,
    pub participants: Vec<WalletAddress>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewExpenseRequest {
    pub group_id: String,
    pub description: String,
    pub amount: f64,
    pub paid_by: WalletAddress,
    pub split_method: SplitMethod,
    pub participants: Vec<WalletAddress>,
    #[serde(default)]
    pub custom_amounts: Option<BTreeMap<WalletAddress, f64>>,
}

/// Creates a group owned by `creator`, who always joins as a participant.
pub async fn create_group(
    store: &dyn LedgerStore,
    creator: &str,
    request: NewGroupRequest,
) -> Result<GroupWithParticipants, LedgerError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyGroupName.into());
    }

    let mut members: Vec<WalletAddress> = vec![creator.to_string()];
    for address in request.participants {
        let address = address.trim().to_string();
        if address.is_empty() {
            return Err(ValidationError::EmptyIdentity.into());
        }
        if members.contains(&address) {
            return Err(ValidationError::DuplicateParticipant(address).into());
        }
        members.push(address);
    }
    if members.len() < 2 {
        return Err(ValidationError::NoParticipants.into());
    }

    let group = store.insert_group(name, creator).await?;
    let records = members
        .into_iter()
        .map(|wallet_address| NewParticipant {
            group_id: group.id.clone(),
            wallet_address,
        })
        .collect();
    store.insert_participants(records).await?;
    let participants = store.list_participants(&group.id).await?;

    info!(group = %group.id, members = participants.len(), "group created");
    Ok(GroupWithParticipants {
        group,
        participants,
    })
}

/// Groups `identity` belongs to, with their participants.
pub async fn list_groups(
    store: &dyn LedgerStore,
    identity: &str,
) -> Result<Vec<GroupWithParticipants>, LedgerError> {
    let ids = store.list_participant_group_ids(identity).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut groups = store.list_groups(&ids).await?;
    groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut result = Vec::with_capacity(groups.len());
    for group in groups {
        let participants = store.list_participants(&group.id).await?;
        result.push(GroupWithParticipants {
            group,
            participants,
        });
    }
    Ok(result)
}

async fn member_group(
    store: &dyn LedgerStore,
    identity: &str,
    group_id: &str,
) -> Result<GroupWithParticipants, LedgerError> {
    let ids = BTreeSet::from([group_id.to_string()]);
    let group = store
        .list_groups(&ids)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| LedgerError::GroupNotFound(group_id.to_string()))?;
    let group = GroupWithParticipants {
        participants: store.list_participants(&group.id).await?,
        group,
    };
    if !group.has_member(identity) {
        // Non-members cannot tell a foreign group from a missing one
        return Err(LedgerError::GroupNotFound(group_id.to_string()));
    }
    Ok(group)
}

pub async fn add_participant(
    store: &dyn LedgerStore,
    identity: &str,
    group_id: &str,
    address: &str,
) -> Result<GroupWithParticipants, LedgerError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ValidationError::EmptyIdentity.into());
    }
    let group = member_group(store, identity, group_id).await?;
    if group.has_member(address) {
        return Err(ValidationError::DuplicateParticipant(address.to_string()).into());
    }

    store
        .insert_participants(vec![NewParticipant {
            group_id: group.group.id.clone(),
            wallet_address: address.to_string(),
        }])
        .await?;
    info!(group = %group.group.id, participant = address, "participant added");
    member_group(store, identity, group_id).await
}

/// Records an expense and its splits.
pub async fn add_expense(
    store: &dyn LedgerStore,
    identity: &str,
    request: NewExpenseRequest,
) -> Result<ExpenseRecord, LedgerError> {
    let group = member_group(store, identity, &request.group_id).await?;

    let description = request.description.trim();
    if description.is_empty() {
        return Err(ValidationError::EmptyDescription.into());
    }
    if !group.has_member(&request.paid_by) {
        return Err(ValidationError::PayerNotInGroup(request.paid_by).into());
    }
    if let Some(outsider) = request.participants.iter().find(|p| !group.has_member(p)) {
        return Err(ValidationError::NotAMember(outsider.clone()).into());
    }

    let shares = compute_splits(
        request.amount,
        request.split_method,
        &request.participants,
        request.custom_amounts.as_ref(),
    )?;

    let expense = store
        .insert_expense(NewExpense {
            group_id: group.group.id.clone(),
            description: description.to_string(),
            amount: request.amount,
            paid_by: request.paid_by,
            split_method: request.split_method,
        })
        .await?;
    let records = shares
        .into_iter()
        .map(|share| NewExpenseSplit {
            expense_id: expense.id.clone(),
            wallet_address: share.wallet_address,
            amount: share.amount,
        })
        .collect();
    store.insert_expense_splits(records).await?;

    info!(
        group = %expense.group_id,
        expense = %expense.id,
        amount = expense.amount,
        "expense recorded"
    );
    let ids = BTreeSet::from([expense.group_id.clone()]);
    store
        .list_expenses_with_splits_and_group_name(&ids)
        .await?
        .into_iter()
        .find(|record| record.expense.id == expense.id)
        .ok_or_else(|| LedgerError::LedgerData(format!("expense {} was not stored", expense.id)))
}

/// Recomputes the session's outstanding balances.
///
/// On failure the previously presented balances stay untouched. If a newer
/// refresh started while this one was fetching, its result wins and the
/// balances it published are returned instead.
pub async fn refresh_balances(
    store: &dyn LedgerStore,
    session: &Session,
) -> Result<Vec<Balance>, LedgerError> {
    let ticket = session.begin_refresh();
    let identity = session.identity();

    let balances = match compute_balances(store, identity).await {
        Ok(balances) => balances,
        Err(err) => {
            warn!(identity, error = %err, "balance refresh failed");
            return Err(err);
        }
    };

    let count = balances.len();
    if session.publish(ticket, balances) {
        info!(identity, balances = count, "balances refreshed");
    }
    Ok(session.desk().balances().to_vec())
}

async fn compute_balances(
    store: &dyn LedgerStore,
    identity: &str,
) -> Result<Vec<Balance>, LedgerError> {
    let ids = store.list_participant_group_ids(identity).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let groups = store.list_groups(&ids).await?;
    let records = store.list_expenses_with_splits_and_group_name(&ids).await?;
    Ok(resolve(&aggregate(identity, &groups, &records)?))
}

/// Pairwise balances between every two participants of one group.
pub async fn group_balances(
    store: &dyn LedgerStore,
    identity: &str,
    group_id: &str,
) -> Result<Vec<Balance>, LedgerError> {
    let group = member_group(store, identity, group_id).await?;
    let ids = BTreeSet::from([group.group.id]);
    let records = store.list_expenses_with_splits_and_group_name(&ids).await?;
    Ok(resolve(&aggregate_group(&records)?))
}

/// Confirms the pending settlement and pays it. A failed transfer leaves the
/// settlement in the `Failed` state, ready to be retried or cancelled.
pub async fn pay(rail: &dyn PaymentRail, session: &Session) -> Result<Settlement, LedgerError> {
    let settlement = session.desk().confirm()?;
    process(rail, session, settlement).await
}

/// Pays a failed settlement again.
pub async fn retry(rail: &dyn PaymentRail, session: &Session) -> Result<Settlement, LedgerError> {
    let settlement = session.desk().retry()?;
    process(rail, session, settlement).await
}

async fn process(
    rail: &dyn PaymentRail,
    session: &Session,
    settlement: Settlement,
) -> Result<Settlement, LedgerError> {
    // The desk is not locked while the transfer is in flight
    let outcome = rail.transfer(&settlement).await;
    let mut desk = session.desk();
    let settlement = match outcome {
        Ok(()) => desk.complete()?,
        Err(reason) => {
            warn!(settlement = %settlement.id, %reason, "payment failed");
            desk.fail(reason)?
        }
    };
    Ok(settlement)
}
