use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::ConfigError;
use crate::plans::PlanTable;

pub const LEVEL1_RATE_KEY: &str = "LEVEL1_REFERRAL_RATE";
pub const LEVEL2_RATE_KEY: &str = "LEVEL2_REFERRAL_RATE";
pub const TASK_LEVEL1_RATE_KEY: &str = "TASK_LEVEL1_REFERRAL_RATE";
pub const TASK_LEVEL2_RATE_KEY: &str = "TASK_LEVEL2_REFERRAL_RATE";
pub const PLANS_KEY: &str = "DEPOSIT_PLANS";
pub const CLAIM_LEASE_KEY: &str = "DEPOSIT_CLAIM_LEASE_SECS";
pub const COMMIT_ATTEMPTS_KEY: &str = "DEPOSIT_COMMIT_ATTEMPTS";

/// Commission rates paid to the two referrer levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferralRates {
    pub level1: Decimal,
    pub level2: Decimal,
}

impl ReferralRates {
    /// Paid once, on a referee's first deposit: 8% and 6%.
    pub fn deposit() -> Self {
        ReferralRates {
            level1: Decimal::new(8, 2),
            level2: Decimal::new(6, 2),
        }
    }

    /// Paid on every task bonus a referee claims: 4% and 6%.
    pub fn task() -> Self {
        ReferralRates {
            level1: Decimal::new(4, 2),
            level2: Decimal::new(6, 2),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub rates: ReferralRates,
    pub task_rates: ReferralRates,
    pub plans: PlanTable,
    /// Seconds after which an unfinished `Processing` claim may be taken over.
    pub claim_lease_secs: i64,
    /// Attempts at committing a deposit when concurrent writers keep changing the user row.
    pub max_commit_attempts: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            rates: ReferralRates::deposit(),
            task_rates: ReferralRates::task(),
            plans: PlanTable::default(),
            claim_lease_secs: 120,
            max_commit_attempts: 3,
        }
    }
}

fn parse_rate(key: &'static str, raw: &str) -> Result<Decimal, ConfigError> {
    let rate = Decimal::from_str(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key,
        reason: e.to_string(),
    })?;
    if rate.is_sign_negative() || rate > Decimal::ONE {
        return Err(ConfigError::InvalidValue {
            key,
            reason: format!("rate {rate} must be between 0 and 1"),
        });
    }
    Ok(rate)
}

fn parse_positive<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value = raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key,
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            key,
            reason: "must be positive".to_string(),
        });
    }
    Ok(value)
}

impl ReconcilerConfig {
    /// Build from a key lookup (the Worker environment in production). Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ReconcilerConfig::default();

        if let Some(raw) = lookup(LEVEL1_RATE_KEY) {
            config.rates.level1 = parse_rate(LEVEL1_RATE_KEY, &raw)?;
        }
        if let Some(raw) = lookup(LEVEL2_RATE_KEY) {
            config.rates.level2 = parse_rate(LEVEL2_RATE_KEY, &raw)?;
        }
        if let Some(raw) = lookup(TASK_LEVEL1_RATE_KEY) {
            config.task_rates.level1 = parse_rate(TASK_LEVEL1_RATE_KEY, &raw)?;
        }
        if let Some(raw) = lookup(TASK_LEVEL2_RATE_KEY) {
            config.task_rates.level2 = parse_rate(TASK_LEVEL2_RATE_KEY, &raw)?;
        }
        if let Some(raw) = lookup(PLANS_KEY) {
            config.plans = PlanTable::from_json(&raw)?;
        }
        if let Some(raw) = lookup(CLAIM_LEASE_KEY) {
            config.claim_lease_secs = parse_positive(CLAIM_LEASE_KEY, &raw)?;
        }
        if let Some(raw) = lookup(COMMIT_ATTEMPTS_KEY) {
            config.max_commit_attempts = parse_positive(COMMIT_ATTEMPTS_KEY, &raw)?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = ReconcilerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ReconcilerConfig::default());
        assert_eq!(config.rates.level1, Decimal::from_str("0.08").unwrap());
        assert_eq!(config.rates.level2, Decimal::from_str("0.06").unwrap());
        assert_eq!(config.task_rates.level1, Decimal::from_str("0.04").unwrap());
        assert_eq!(config.task_rates.level2, Decimal::from_str("0.06").unwrap());
    }

    #[test]
    fn overrides_rates_and_plans() {
        let config = ReconcilerConfig::from_lookup(lookup(&[
            (LEVEL2_RATE_KEY, "0.10"),
            (TASK_LEVEL1_RATE_KEY, "0.05"),
            (PLANS_KEY, r#"[{"minAmount": 10, "dailyProfit": 1, "durationDays": 7}]"#),
            (CLAIM_LEASE_KEY, "30"),
            (COMMIT_ATTEMPTS_KEY, "5"),
        ]))
        .unwrap();

        assert_eq!(config.rates.level2, Decimal::from_str("0.10").unwrap());
        assert_eq!(config.rates.level1, ReferralRates::deposit().level1);
        assert_eq!(config.task_rates.level1, Decimal::from_str("0.05").unwrap());
        assert_eq!(config.task_rates.level2, ReferralRates::task().level2);
        assert_eq!(config.plans.tiers().len(), 1);
        assert_eq!(config.claim_lease_secs, 30);
        assert_eq!(config.max_commit_attempts, 5);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            ReconcilerConfig::from_lookup(lookup(&[(LEVEL1_RATE_KEY, "1.5")])),
            Err(ConfigError::InvalidValue { key: LEVEL1_RATE_KEY, .. })
        ));
        assert!(matches!(
            ReconcilerConfig::from_lookup(lookup(&[(LEVEL2_RATE_KEY, "-0.1")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            ReconcilerConfig::from_lookup(lookup(&[(COMMIT_ATTEMPTS_KEY, "0")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            ReconcilerConfig::from_lookup(lookup(&[(PLANS_KEY, "[]")])),
            Err(ConfigError::InvalidPlans(_))
        ));
    }
}
