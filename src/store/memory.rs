use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::LedgerStore;
use crate::error::{LedgerError, ValidationError};
use crate::schemas::{
    Expense, ExpenseRecord, ExpenseSplit, Group, GroupId, NewExpense, NewExpenseSplit,
    NewParticipant, Participant,
};

#[derive(Debug, Default)]
struct Tables {
    groups: Vec<Group>,
    participants: Vec<Participant>,
    expenses: Vec<Expense>,
    splits: Vec<ExpenseSplit>,
}

/// Process-local store for tests and single-node demos.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StoreUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stores an expense and its splits as given, bypassing validation.
    pub fn insert_raw(&self, expense: Expense, splits: Vec<ExpenseSplit>) {
        let mut tables = self.lock();
        tables.expenses.push(expense);
        tables.splits.extend(splits);
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::StoreUnavailable(
                "memory store switched off".to_string(),
            ));
        }
        Ok(self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn list_participant_group_ids(
        &self,
        identity: &str,
    ) -> Result<BTreeSet<GroupId>, LedgerError> {
        Ok(self
            .tables()?
            .participants
            .iter()
            .filter(|p| p.wallet_address == identity)
            .map(|p| p.group_id.clone())
            .collect())
    }

    async fn list_groups(&self, ids: &BTreeSet<GroupId>) -> Result<Vec<Group>, LedgerError> {
        Ok(self
            .tables()?
            .groups
            .iter()
            .filter(|g| ids.contains(&g.id))
            .cloned()
            .collect())
    }

    async fn list_participants(&self, group_id: &str) -> Result<Vec<Participant>, LedgerError> {
        Ok(self
            .tables()?
            .participants
            .iter()
            .filter(|p| p.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn insert_group(&self, name: &str, created_by: &str) -> Result<Group, LedgerError> {
        let group = Group {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        self.tables()?.groups.push(group.clone());
        Ok(group)
    }

    async fn insert_participants(&self, records: Vec<NewParticipant>) -> Result<(), LedgerError> {
        let mut tables = self.tables()?;
        for record in &records {
            let taken = tables.participants.iter().any(|p| {
                p.group_id == record.group_id && p.wallet_address == record.wallet_address
            });
            if taken {
                return Err(ValidationError::DuplicateParticipant(
                    record.wallet_address.clone(),
                )
                .into());
            }
        }
        let joined_at = Utc::now();
        tables
            .participants
            .extend(records.into_iter().map(|record| Participant {
                id: Uuid::new_v4().to_string(),
                group_id: record.group_id,
                wallet_address: record.wallet_address,
                joined_at,
            }));
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
        self.tables()?.expenses.push(expense.clone());
        Ok(expense)
    }

    async fn insert_expense_splits(
        &self,
        records: Vec<NewExpenseSplit>,
    ) -> Result<(), LedgerError> {
        self.tables()?
            .splits
            .extend(records.into_iter().map(|record| ExpenseSplit {
                id: Uuid::new_v4().to_string(),
                expense_id: record.expense_id,
                wallet_address: record.wallet_address,
                amount: record.amount,
            }));
        Ok(())
    }

    async fn list_expenses_with_splits_and_group_name(
        &self,
        group_ids: &BTreeSet<GroupId>,
    ) -> Result<Vec<ExpenseRecord>, LedgerError> {
        let tables = self.tables()?;
        Ok(tables
            .expenses
            .iter()
            .filter(|e| group_ids.contains(&e.group_id))
            .map(|expense| ExpenseRecord {
                expense: expense.clone(),
                splits: tables
                    .splits
                    .iter()
                    .filter(|s| s.expense_id == expense.id)
                    .cloned()
                    .collect(),
                group_name: tables
                    .groups
                    .iter()
                    .find(|g| g.id == expense.group_id)
                    .map(|g| g.name.clone()),
            })
            .collect())
    }
}
