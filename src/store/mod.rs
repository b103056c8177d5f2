use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::schemas::{
    Expense, ExpenseRecord, Group, GroupId, NewExpense, NewExpenseSplit, NewParticipant,
    Participant,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Persistence used by the ledger. Single-row writes are assumed atomic.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn list_participant_group_ids(&self, identity: &str)
        -> Result<BTreeSet<GroupId>, LedgerError>;

    async fn list_groups(&self, ids: &BTreeSet<GroupId>) -> Result<Vec<Group>, LedgerError>;

    async fn list_participants(&self, group_id: &str) -> Result<Vec<Participant>, LedgerError>;

    async fn insert_group(&self, name: &str, created_by: &str) -> Result<Group, LedgerError>;

    async fn insert_participants(&self, records: Vec<NewParticipant>) -> Result<(), LedgerError>;

    async fn insert_expense(&self, expense: NewExpense) -> Result<Expense, LedgerError>;

    async fn insert_expense_splits(&self, records: Vec<NewExpenseSplit>)
        -> Result<(), LedgerError>;

    async fn list_expenses_with_splits_and_group_name(
        &self,
        group_ids: &BTreeSet<GroupId>,
    ) -> Result<Vec<ExpenseRecord>, LedgerError>;
}
