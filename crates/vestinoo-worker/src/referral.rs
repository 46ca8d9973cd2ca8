//! Two-level referrer lookup, shared by deposits and task bonus claims.

use crate::config::ReferralRates;
use crate::error::StoreError;
use crate::money::Money;
use crate::store::{LedgerStore, ReferralCredit, ReferralLevel, UserRecord};

/// Resolve `user`'s level-1 and level-2 referrers to user ids, in level order.
///
/// An unknown code or a self-referral resolves to nothing and leaves a warning.
/// A code shared by several users resolves to the lowest user id.
pub async fn resolve_referrers<S>(
    store: &S,
    user: &UserRecord,
    warnings: &mut Vec<String>,
) -> Result<Vec<(ReferralLevel, String)>, StoreError>
where
    S: LedgerStore + ?Sized,
{
    let chain = [
        (ReferralLevel::Level1, user.referral_by.as_deref()),
        (ReferralLevel::Level2, user.level2_referral_by.as_deref()),
    ];

    let mut referrers = Vec::new();
    for (level, code) in chain {
        let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
            continue;
        };
        let n = u8::from(level);

        let matches = store.find_users_by_referral_code(code).await?;
        let Some((referrer, duplicates)) = matches.split_first() else {
            warnings.push(format!("level {n} referrer with code `{code}` not found"));
            continue;
        };
        if !duplicates.is_empty() {
            warnings.push(format!(
                "referral code `{code}` matches {} users; crediting `{}`",
                matches.len(),
                referrer.id
            ));
        }
        if referrer.id == user.id {
            warnings.push(format!("user `{}` refers themselves at level {n}", user.id));
            continue;
        }

        referrers.push((level, referrer.id.clone()));
    }
    Ok(referrers)
}

/// Commission on `amount` for each resolved referrer. `None` on overflow.
pub fn referral_credits(
    referrers: &[(ReferralLevel, String)],
    rates: &ReferralRates,
    amount: Money,
) -> Option<Vec<ReferralCredit>> {
    referrers
        .iter()
        .map(|(level, referrer_id)| {
            let rate = match level {
                ReferralLevel::Level1 => rates.level1,
                ReferralLevel::Level2 => rates.level2,
            };
            Some(ReferralCredit {
                referrer_id: referrer_id.clone(),
                level: *level,
                amount: amount.scale(rate)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::memory::InMemoryStore;

    fn user(id: &str, code: &str, by: Option<&str>, by2: Option<&str>) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            referral_code: code.to_string(),
            referral_by: by.map(str::to_string),
            level2_referral_by: by2.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn resolves_both_levels_in_order() {
        let store = InMemoryStore::new();
        store.insert_user(user("a", "A", None, None));
        store.insert_user(user("b", "B", Some("A"), None));
        let c = user("c", "C", Some(" B "), Some("A"));

        let mut warnings = Vec::new();
        let referrers = resolve_referrers(&store, &c, &mut warnings).await.unwrap();
        assert_eq!(
            referrers,
            vec![(ReferralLevel::Level1, "b".to_string()), (ReferralLevel::Level2, "a".to_string())]
        );
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn skips_self_and_unknown_referrers() {
        let store = InMemoryStore::new();
        let me = user("me", "ME", Some("ME"), Some("GONE"));
        store.insert_user(me.clone());

        let mut warnings = Vec::new();
        assert!(resolve_referrers(&store, &me, &mut warnings).await.unwrap().is_empty());
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn credits_use_the_rate_of_each_level() {
        let rates = ReferralRates {
            level1: Decimal::new(4, 2),
            level2: Decimal::new(6, 2),
        };
        let referrers = vec![(ReferralLevel::Level1, "b".to_string()), (ReferralLevel::Level2, "a".to_string())];

        let credits = referral_credits(&referrers, &rates, Money::from_cents(1_250)).unwrap();
        assert_eq!(credits[0].amount, Money::from_cents(50));
        assert_eq!(credits[1].amount, Money::from_cents(75));
        assert_eq!(credits[1].referrer_id, "a");
    }
}
