pub mod auth;
pub mod balance;
pub mod config;
pub mod error;
pub mod ledger;
pub mod payment;
pub mod routes;
pub mod schemas;
pub mod service;
pub mod session;
pub mod settlement;
pub mod split;
pub mod store;
pub mod telemetry;

pub use balance::{resolve, summarize, Balance, BalanceSummary};
pub use error::{LedgerError, ValidationError};
pub use ledger::{aggregate, aggregate_group, UserPair};
pub use settlement::{Phase, Settlement, SettlementDesk, SettlementError};
pub use split::compute_splits;
