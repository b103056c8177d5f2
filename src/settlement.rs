//! Settlement lifecycle for a single balance.
//!
//! ```text
//! Idle -> AwaitingConfirmation -> Processing -> Completed -> Idle
//!              |                      |
//!              v                      v
//!             Idle                  Failed -> Processing (retry) | Idle (cancel)
//! ```
//!
//! Only one settlement exists per desk at a time. Finishing a completed
//! settlement removes its balance from the working set by equality with the
//! snapshot taken at initiation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::balance::Balance;

pub const DEFAULT_TRANSACTION_FEE: f64 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingConfirmation,
    Processing,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettlementStatus {
    AwaitingConfirmation,
    Processing,
    Completed,
    Failed { reason: String },
}

impl SettlementStatus {
    pub fn phase(&self) -> Phase {
        match self {
            SettlementStatus::AwaitingConfirmation => Phase::AwaitingConfirmation,
            SettlementStatus::Processing => Phase::Processing,
            SettlementStatus::Completed => Phase::Completed,
            SettlementStatus::Failed { .. } => Phase::Failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Settlement {
    pub id: Uuid,
    pub balance: Balance,
    #[serde(flatten)]
    pub status: SettlementStatus,
    pub fee: f64,
    pub initiated_at: DateTime<Utc>,
}

impl Settlement {
    /// What the debtor pays: the balance plus the transaction fee.
    pub fn total(&self) -> f64 {
        self.balance.amount + self.fee
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettlementError {
    #[error("a settlement is already in progress")]
    AlreadyActive,

    #[error("no settlement in progress")]
    NoSettlement,

    #[error("cannot {action} while {phase:?}")]
    InvalidTransition { phase: Phase, action: &'static str },

    #[error("only {0} can pay this balance")]
    NotDebtor(String),

    #[error("balance is not among the outstanding balances")]
    UnknownBalance,
}

/// The outstanding balances presented to one user plus the settlement they
/// are working through, if any.
#[derive(Debug)]
pub struct SettlementDesk {
    balances: Vec<Balance>,
    active: Option<Settlement>,
    fee: f64,
}

impl Default for SettlementDesk {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSACTION_FEE)
    }
}

impl SettlementDesk {
    pub fn new(fee: f64) -> Self {
        SettlementDesk {
            balances: Vec::new(),
            active: None,
            fee,
        }
    }

    pub fn balances(&self) -> &[Balance] {
        &self.balances
    }

    pub fn replace_balances(&mut self, balances: Vec<Balance>) {
        self.balances = balances;
    }

    pub fn current(&self) -> Option<&Settlement> {
        self.active.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.active
            .as_ref()
            .map_or(Phase::Idle, |settlement| settlement.status.phase())
    }

    pub fn initiate(
        &mut self,
        payer: &str,
        balance: Balance,
    ) -> Result<&Settlement, SettlementError> {
        if self.active.is_some() {
            return Err(SettlementError::AlreadyActive);
        }
        if balance.debtor != payer {
            return Err(SettlementError::NotDebtor(balance.debtor));
        }
        if !self.balances.contains(&balance) {
            return Err(SettlementError::UnknownBalance);
        }

        let settlement = Settlement {
            id: Uuid::new_v4(),
            balance,
            status: SettlementStatus::AwaitingConfirmation,
            fee: self.fee,
            initiated_at: Utc::now(),
        };
        info!(
            settlement = %settlement.id,
            creditor = %settlement.balance.creditor,
            amount = settlement.balance.amount,
            "settlement initiated"
        );
        let settlement = self.active.insert(settlement);
        Ok(&*settlement)
    }

    /// AwaitingConfirmation -> Processing. Returns the snapshot to pay.
    pub fn confirm(&mut self) -> Result<Settlement, SettlementError> {
        self.transition("confirm", &[Phase::AwaitingConfirmation], SettlementStatus::Processing)
    }

    /// Failed -> Processing.
    pub fn retry(&mut self) -> Result<Settlement, SettlementError> {
        self.transition("retry", &[Phase::Failed], SettlementStatus::Processing)
    }

    pub fn complete(&mut self) -> Result<Settlement, SettlementError> {
        self.transition("complete", &[Phase::Processing], SettlementStatus::Completed)
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<Settlement, SettlementError> {
        let status = SettlementStatus::Failed {
            reason: reason.into(),
        };
        self.transition("fail", &[Phase::Processing], status)
    }

    /// Drops the settlement without touching the balances.
    pub fn cancel(&mut self) -> Result<Settlement, SettlementError> {
        let phase = self.phase();
        match phase {
            Phase::Idle => Err(SettlementError::NoSettlement),
            Phase::AwaitingConfirmation | Phase::Failed => {
                let settlement = self.active.take().ok_or(SettlementError::NoSettlement)?;
                info!(settlement = %settlement.id, "settlement cancelled");
                Ok(settlement)
            }
            Phase::Processing | Phase::Completed => Err(SettlementError::InvalidTransition {
                phase,
                action: "cancel",
            }),
        }
    }

    /// Completed -> Idle, removing the settled balance from the working set.
    pub fn finish(&mut self) -> Result<Balance, SettlementError> {
        let phase = self.phase();
        if phase != Phase::Completed {
            return Err(match phase {
                Phase::Idle => SettlementError::NoSettlement,
                _ => SettlementError::InvalidTransition {
                    phase,
                    action: "finish",
                },
            });
        }
        let settlement = self.active.take().ok_or(SettlementError::NoSettlement)?;
        if let Some(index) = self.balances.iter().position(|b| *b == settlement.balance) {
            self.balances.remove(index);
        }
        info!(settlement = %settlement.id, "settlement finished");
        Ok(settlement.balance)
    }

    fn transition(
        &mut self,
        action: &'static str,
        from: &[Phase],
        to: SettlementStatus,
    ) -> Result<Settlement, SettlementError> {
        let settlement = self.active.as_mut().ok_or(SettlementError::NoSettlement)?;
        let phase = settlement.status.phase();
        if !from.contains(&phase) {
            return Err(SettlementError::InvalidTransition { phase, action });
        }
        debug!(settlement = %settlement.id, ?phase, next = ?to.phase(), "settlement transition");
        settlement.status = to;
        Ok(settlement.clone())
    }
}
