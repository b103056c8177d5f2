use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type WalletAddress = String;
pub type GroupId = String;
pub type ExpenseId = String;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub created_by: WalletAddress,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Participant {
    pub id: String,
    pub group_id: GroupId,
    pub wallet_address: WalletAddress,
    pub joined_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMethod {
    Equal,
    Custom,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub group_id: GroupId,
    pub description: String,
    pub amount: f64,
    pub paid_by: WalletAddress,
    pub split_method: SplitMethod,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExpenseSplit {
    pub id: String,
    pub expense_id: ExpenseId,
    pub wallet_address: WalletAddress,
    pub amount: f64,
}

/// An expense joined with its splits and the display name of its group.
///
/// `group_name` is `None` when the store could not resolve the group, which the
/// aggregator reports as malformed data instead of inventing a name.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpenseRecord {
    pub expense: Expense,
    pub splits: Vec<ExpenseSplit>,
    pub group_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NewParticipant {
    pub group_id: GroupId,
    pub wallet_address: WalletAddress,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NewExpense {
    pub group_id: GroupId,
    pub description: String,
    pub amount: f64,
    pub paid_by: WalletAddress,
    pub split_method: SplitMethod,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NewExpenseSplit {
    pub expense_id: ExpenseId,
    pub wallet_address: WalletAddress,
    pub amount: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupWithParticipants {
    #[serde(flatten)]
    pub group: Group,
    pub participants: Vec<Participant>,
}

impl GroupWithParticipants {
    pub fn has_member(&self, address: &str) -> bool {
        self.participants
            .iter()
            .any(|participant| participant.wallet_address == address)
    }
}
