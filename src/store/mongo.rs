use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use bson::doc;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    error::{Error as MongoError, ErrorKind},
    options::IndexOptions,
    Client, Collection, Database, IndexModel,
};
use tracing::{error, info};
use uuid::Uuid;

use super::LedgerStore;
use crate::error::{LedgerError, ValidationError};
use crate::schemas::{
    Expense, ExpenseRecord, ExpenseSplit, Group, GroupId, NewExpense, NewExpenseSplit,
    NewParticipant, Participant,
};

#[derive(Clone, Debug)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, LedgerError> {
        let client = Client::with_uri_str(uri).await.map_err(store_error)?;
        info!(database, "connected to MongoDB");
        Ok(MongoStore {
            db: client.database(database),
        })
    }

    /// One membership per wallet and group.
    pub async fn ensure_indexes(&self) -> Result<(), LedgerError> {
        let unique_member = IndexModel::builder()
            .keys(doc! { "group_id": 1, "wallet_address": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.participants()
            .create_index(unique_member, None)
            .await
            .map_err(store_error)?;

        let by_expense = IndexModel::builder()
            .keys(doc! { "expense_id": 1 })
            .build();
        self.splits()
            .create_index(by_expense, None)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    fn groups(&self) -> Collection<Group> {
        self.db.collection("Groups")
    }

    fn participants(&self) -> Collection<Participant> {
        self.db.collection("Participants")
    }

    fn expenses(&self) -> Collection<Expense> {
        self.db.collection("Expenses")
    }

    fn splits(&self) -> Collection<ExpenseSplit> {
        self.db.collection("ExpenseSplits")
    }
}

fn store_error(err: MongoError) -> LedgerError {
    match *err.kind {
        ErrorKind::BsonDeserialization(ref cause) => LedgerError::LedgerData(cause.to_string()),
        _ => {
            error!(error = %err, "MongoDB request failed");
            LedgerError::StoreUnavailable(err.to_string())
        }
    }
}

const DUPLICATE_KEY: i32 = 11000;

/// Position of the first write rejected by a unique index, if any.
fn duplicate_key_index(err: &MongoError) -> Option<usize> {
    match *err.kind {
        ErrorKind::BulkWrite(ref failure) => failure
            .write_errors
            .as_ref()?
            .iter()
            .find(|write| write.code == DUPLICATE_KEY)
            .map(|write| write.index),
        _ => None,
    }
}

/// Maps a membership rejected by the unique index to `DuplicateParticipant`.
fn participant_insert_error(
    addresses: &[String],
    duplicate: Option<usize>,
    err: MongoError,
) -> LedgerError {
    match duplicate.and_then(|index| addresses.get(index)) {
        Some(address) => ValidationError::DuplicateParticipant(address.clone()).into(),
        None => store_error(err),
    }
}

fn ids_of(ids: &BTreeSet<GroupId>) -> Vec<String> {
    ids.iter().cloned().collect()
}

#[async_trait]
impl LedgerStore for MongoStore {
    async fn list_participant_group_ids(
        &self,
        identity: &str,
    ) -> Result<BTreeSet<GroupId>, LedgerError> {
        let participants: Vec<Participant> = self
            .participants()
            .find(doc! { "wallet_address": identity }, None)
            .await
            .map_err(store_error)?
            .try_collect()
            .await
            .map_err(store_error)?;
        Ok(participants.into_iter().map(|p| p.group_id).collect())
    }

    async fn list_groups(&self, ids: &BTreeSet<GroupId>) -> Result<Vec<Group>, LedgerError> {
        self.groups()
            .find(doc! { "id": { "$in": ids_of(ids) } }, None)
            .await
            .map_err(store_error)?
            .try_collect()
            .await
            .map_err(store_error)
    }

    async fn list_participants(&self, group_id: &str) -> Result<Vec<Participant>, LedgerError> {
        self.participants()
            .find(doc! { "group_id": group_id }, None)
            .await
            .map_err(store_error)?
            .try_collect()
            .await
            .map_err(store_error)
    }

    async fn insert_group(&self, name: &str, created_by: &str) -> Result<Group, LedgerError> {
        let group = Group {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        self.groups()
            .insert_one(&group, None)
            .await
            .map_err(store_error)?;
        Ok(group)
    }

    async fn insert_participants(&self, records: Vec<NewParticipant>) -> Result<(), LedgerError> {
        if records.is_empty() {
            return Ok(());
        }
        let joined_at = Utc::now();
        let addresses: Vec<String> = records.iter().map(|r| r.wallet_address.clone()).collect();
        let participants = records.into_iter().map(|record| Participant {
            id: Uuid::new_v4().to_string(),
            group_id: record.group_id,
            wallet_address: record.wallet_address,
            joined_at,
        });
        self.participants()
            .insert_many(participants, None)
            .await
            .map_err(|err| {
                let duplicate = duplicate_key_index(&err);
                participant_insert_error(&addresses, duplicate, err)
            })?;
        Ok(())
    }

    async fn insert_expense(&self, expense: NewExpense) -> Result<Expense, LedgerError> {
        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            group_id: expense.group_id,
            description: expense.description,
            amount: expense.amount,
            paid_by: expense.paid_by,
            split_method: expense.split_method,
            created_at: Utc::now(),
        };
        self.expenses()
            .insert_one(&expense, None)
            .await
            .map_err(store_error)?;
        Ok(expense)
    }

    async fn insert_expense_splits(
        &self,
        records: Vec<NewExpenseSplit>,
    ) -> Result<(), LedgerError> {
        if records.is_empty() {
            return Ok(());
        }
        let splits = records.into_iter().map(|record| ExpenseSplit {
            id: Uuid::new_v4().to_string(),
            expense_id: record.expense_id,
            wallet_address: record.wallet_address,
            amount: record.amount,
        });
        self.splits()
            .insert_many(splits, None)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn list_expenses_with_splits_and_group_name(
        &self,
        group_ids: &BTreeSet<GroupId>,
    ) -> Result<Vec<ExpenseRecord>, LedgerError> {
        let expenses: Vec<Expense> = self
            .expenses()
            .find(doc! { "group_id": { "$in": ids_of(group_ids) } }, None)
            .await
            .map_err(store_error)?
            .try_collect()
            .await
            .map_err(store_error)?;

        let expense_ids: Vec<String> = expenses.iter().map(|e| e.id.clone()).collect();
        let splits: Vec<ExpenseSplit> = self
            .splits()
            .find(doc! { "expense_id": { "$in": expense_ids } }, None)
            .await
            .map_err(store_error)?
            .try_collect()
            .await
            .map_err(store_error)?;

        let group_names: HashMap<GroupId, String> = self
            .list_groups(group_ids)
            .await?
            .into_iter()
            .map(|group| (group.id, group.name))
            .collect();

        let mut splits_by_expense: HashMap<String, Vec<ExpenseSplit>> = HashMap::new();
        for split in splits {
            splits_by_expense
                .entry(split.expense_id.clone())
                .or_default()
                .push(split);
        }

        Ok(expenses
            .into_iter()
            .map(|expense| ExpenseRecord {
                splits: splits_by_expense.remove(&expense.id).unwrap_or_default(),
                group_name: group_names.get(&expense.group_id).cloned(),
                expense,
            })
            .collect())
    }
}
