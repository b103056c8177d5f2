use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::settlement::Settlement;

/// Moves money for a confirmed settlement.
#[async_trait]
pub trait PaymentRail: Send + Sync {
    async fn transfer(&self, settlement: &Settlement) -> Result<(), String>;
}

/// Stands in for an on-chain transfer: waits a fixed delay and succeeds.
#[derive(Clone, Debug)]
pub struct SimulatedRail {
    delay: Duration,
}

impl SimulatedRail {
    pub fn new(delay: Duration) -> Self {
        SimulatedRail { delay }
    }
}

#[async_trait]
impl PaymentRail for SimulatedRail {
    async fn transfer(&self, settlement: &Settlement) -> Result<(), String> {
        tokio::time::sleep(self.delay).await;
        info!(
            settlement = %settlement.id,
            from = %settlement.balance.debtor,
            to = %settlement.balance.creditor,
            total = settlement.total(),
            "simulated transfer confirmed"
        );
        Ok(())
    }
}
