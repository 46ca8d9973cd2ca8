use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::money::Money;

pub const SECS_PER_DAY: i64 = 86_400;

/// A threshold-based payout rate activated once cumulative deposits reach `min_amount`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTier {
    pub min_amount: Money,
    pub daily_profit: Money,
    pub duration_days: u32,
}

impl PlanTier {
    const fn new(min_cents: i64, daily_cents: i64, duration_days: u32) -> Self {
        PlanTier {
            min_amount: Money::from_cents(min_cents),
            daily_profit: Money::from_cents(daily_cents),
            duration_days,
        }
    }

    /// When a plan activated at `activated_at` (Unix seconds) stops paying.
    pub fn ends_at(&self, activated_at: i64) -> i64 {
        activated_at.saturating_add(i64::from(self.duration_days) * SECS_PER_DAY)
    }
}

const DEFAULT_TIERS: [PlanTier; 10] = [
    PlanTier::new(80_000, 3_080, 49),
    PlanTier::new(40_000, 1_680, 45),
    PlanTier::new(20_000, 890, 43),
    PlanTier::new(10_000, 480, 40),
    PlanTier::new(5_000, 264, 35),
    PlanTier::new(3_000, 162, 34),
    PlanTier::new(1_500, 87, 33),
    PlanTier::new(800, 46, 32),
    PlanTier::new(400, 25, 31),
    PlanTier::new(200, 16, 22),
];

/// Investment plans ordered strictly descending by threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PlanTable {
    tiers: Vec<PlanTier>,
}

impl PlanTable {
    pub fn new(tiers: Vec<PlanTier>) -> Result<Self, ConfigError> {
        if tiers.is_empty() {
            return Err(ConfigError::InvalidPlans("plan table is empty".to_string()));
        }

        for tier in &tiers {
            if !tier.min_amount.is_positive() {
                return Err(ConfigError::InvalidPlans(format!(
                    "plan threshold {} must be positive",
                    tier.min_amount
                )));
            }
            if tier.daily_profit.cents() < 0 {
                return Err(ConfigError::InvalidPlans(format!(
                    "plan {} has a negative daily profit",
                    tier.min_amount
                )));
            }
            if tier.duration_days == 0 {
                return Err(ConfigError::InvalidPlans(format!(
                    "plan {} must run for at least one day",
                    tier.min_amount
                )));
            }
        }

        if let Some(pair) = tiers.windows(2).find(|w| w[0].min_amount <= w[1].min_amount) {
            return Err(ConfigError::InvalidPlans(format!(
                "plan thresholds must be strictly descending ({} then {})",
                pair[0].min_amount, pair[1].min_amount
            )));
        }

        Ok(PlanTable { tiers })
    }

    /// Parse a JSON array of `{minAmount, dailyProfit, durationDays}` objects.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let tiers: Vec<PlanTier> =
            serde_json::from_str(raw).map_err(|e| ConfigError::InvalidPlans(e.to_string()))?;
        PlanTable::new(tiers)
    }

    /// The highest tier whose threshold does not exceed `total`.
    ///
    /// Returns the first match in table order.
    pub fn select(&self, total: Money) -> Option<&PlanTier> {
        self.tiers.iter().find(|tier| tier.min_amount <= total)
    }

    pub fn tiers(&self) -> &[PlanTier] {
        &self.tiers
    }
}

impl Default for PlanTable {
    fn default() -> Self {
        PlanTable {
            tiers: DEFAULT_TIERS.to_vec(),
        }
    }
}
