use async_trait::async_trait;

use crate::error::NotifyError;
use crate::reconcile::AppliedDeposit;

/// Downstream housekeeping (gas top-up, wallet sweep) told about each applied deposit.
///
/// Called after the deposit is durably applied; a failure is recorded but never
/// undoes the deposit.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait DepositNotifier {
    async fn deposit_applied(&self, deposit: &AppliedDeposit) -> Result<(), NotifyError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl DepositNotifier for NoopNotifier {
    async fn deposit_applied(&self, _deposit: &AppliedDeposit) -> Result<(), NotifyError> {
        Ok(())
    }
}
