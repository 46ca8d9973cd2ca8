use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;

use vestinoo_worker::bonus::{
    claim_referral_bonus, claim_task_bonus, BonusClaimRequest, TaskBonusClaim, TaskBonusRequest,
};
use vestinoo_worker::config::ReconcilerConfig;
use vestinoo_worker::error::StoreError;
use vestinoo_worker::memory::InMemoryStore;
use vestinoo_worker::money::Money;
use vestinoo_worker::notify::NoopNotifier;
use vestinoo_worker::postback::{credit_adgem_postback, verify_adgem_postback, PostbackError};
use vestinoo_worker::profit::{claim_daily_profit, ProfitClaim, ProfitClaimRequest, CLAIM_INTERVAL_SECS};
use vestinoo_worker::reconcile::Reconciler;
use vestinoo_worker::signature::sign_hex;
use vestinoo_worker::store::{
    BonusClaim, LedgerStore, PostbackOutcome, ProfitCommit, ReferralCredit, ReferralLevel, TaskBonusCommit,
    UserRecord,
};

const NOW: i64 = 1_750_000_000;
const ADGEM_KEY: &[u8] = b"adgem-postback-key";

fn store_with(users: &[(&str, &str, Option<&str>)]) -> InMemoryStore {
    let store = InMemoryStore::new();
    for (id, code, referred_by) in users {
        store.insert_user(UserRecord {
            id: id.to_string(),
            referral_code: code.to_string(),
            referral_by: referred_by.map(str::to_string),
            ..Default::default()
        });
    }
    store
}

/// `owner` referred `friend`, who referred `grand`. `grand` has 12.50 of task bonus.
fn task_tree() -> InMemoryStore {
    let store = store_with(&[("owner", "OWN", None), ("friend", "FRND", Some("OWN"))]);
    store.insert_user(UserRecord {
        id: "grand".into(),
        referral_code: "GRND".into(),
        referral_by: Some("FRND".into()),
        level2_referral_by: Some("OWN".into()),
        task_bonus: Money::from_cents(1_250),
        ..Default::default()
    });
    store
}

fn task_request(uid: &str) -> TaskBonusRequest {
    TaskBonusRequest::from_json(&json!({ "uid": uid })).unwrap()
}

fn profit_request(uid: &str) -> ProfitClaimRequest {
    ProfitClaimRequest::from_json(&json!({ "uid": uid })).unwrap()
}

fn adgem_url(query: &str) -> String {
    let base = format!("https://vestinoo.example.workers.dev/api/postbacks/adgem?{query}");
    let verifier = sign_hex(ADGEM_KEY, base.as_bytes()).unwrap();
    format!("{base}&verifier={verifier}")
}

#[tokio::test]
async fn earned_commission_can_be_claimed_once() {
    let rec = Reconciler::new(
        store_with(&[("owner", "OWN", None), ("friend", "FRND", Some("OWN"))]),
        NoopNotifier,
        ReconcilerConfig::default(),
    );
    let event = json!({
        "transactionId": "tx-friend",
        "status": "success",
        "amount": 250,
        "userId": "friend",
    });
    rec.process(&event, NOW).await.unwrap();

    let request = BonusClaimRequest::from_json(&json!({"uid": "owner", "level": 1})).unwrap();
    let first = claim_referral_bonus(rec.store(), &request).await.unwrap();
    assert_eq!(
        first,
        BonusClaim::Claimed {
            amount: Money::from_cents(2_000),
            balance: Money::from_cents(2_000),
        }
    );

    let second = claim_referral_bonus(rec.store(), &request).await.unwrap();
    assert_eq!(second, BonusClaim::NothingToClaim);

    let owner = rec.store().user("owner").unwrap();
    assert_eq!(owner.referral_bonus_level1, Money::ZERO);
    assert_eq!(owner.user_balance, Money::from_cents(2_000));
    // The referral count is history, not a claimable balance.
    assert_eq!(owner.level1, 1);
}

#[tokio::test]
async fn claiming_for_unknown_user_reports_not_found() {
    let store = store_with(&[]);
    let request = BonusClaimRequest::from_json(&json!({"uid": "nobody", "level": 2})).unwrap();
    assert_eq!(
        claim_referral_bonus(&store, &request).await.unwrap(),
        BonusClaim::UserNotFound
    );
}

#[tokio::test]
async fn verified_postback_credits_half_the_payout_once() {
    let store = store_with(&[("player", "PLAY", None)]);
    let url = adgem_url("uid=player&payout=2.45&offer=9001&transaction=ag-tx-1");

    let postback = verify_adgem_postback(&url, ADGEM_KEY).unwrap();
    let outcome = credit_adgem_postback(&store, &postback, NOW).await.unwrap();
    // 2.45 / 2 = 1.225, rounded half away from zero.
    assert_eq!(
        outcome,
        PostbackOutcome::Credited {
            task_bonus: Money::from_cents(123)
        }
    );

    let again = credit_adgem_postback(&store, &postback, NOW + 1).await.unwrap();
    assert_eq!(again, PostbackOutcome::AlreadyProcessed);

    assert_eq!(store.user("player").unwrap().task_bonus, Money::from_cents(123));
    let logged = store.postback("ag-tx-1").unwrap();
    assert_eq!(logged.offer, "9001");
    assert_eq!(logged.payout, Money::from_cents(245));
    assert_eq!(logged.created_at, NOW);
}

#[tokio::test]
async fn postback_for_unknown_user_is_not_recorded() {
    let store = store_with(&[]);
    let url = adgem_url("uid=ghost&payout=1&offer=1&transaction=ag-tx-2");

    let postback = verify_adgem_postback(&url, ADGEM_KEY).unwrap();
    assert_eq!(
        credit_adgem_postback(&store, &postback, NOW).await.unwrap(),
        PostbackOutcome::UserNotFound
    );
    assert!(store.postback("ag-tx-2").is_none());
}

#[tokio::test]
async fn forged_postback_never_reaches_the_ledger() {
    let url = adgem_url("uid=player&payout=1&offer=1&transaction=ag-tx-3").replace("payout=1", "payout=500");
    assert_eq!(
        verify_adgem_postback(&url, ADGEM_KEY),
        Err(PostbackError::InvalidVerifier)
    );
}

#[tokio::test]
async fn task_bonus_moves_to_balance_and_pays_task_commission() {
    let store = task_tree();
    let config = ReconcilerConfig::default();

    let claim = claim_task_bonus(&store, &task_request("grand"), &config, NOW).await.unwrap();
    let (amount, balance, referral_credits, warnings) = match claim {
        TaskBonusClaim::Claimed {
            amount,
            balance,
            referral_credits,
            warnings,
        } => (amount, balance, referral_credits, warnings),
        other => panic!("expected a claim, got {other:?}"),
    };
    assert_eq!(amount, Money::from_cents(1_250));
    assert_eq!(balance, Money::from_cents(1_250));
    assert!(warnings.is_empty());
    assert_eq!(referral_credits.len(), 2);
    assert_eq!(referral_credits[0].level, ReferralLevel::Level1);
    assert_eq!(referral_credits[0].amount, Money::from_cents(50));
    assert_eq!(referral_credits[1].amount, Money::from_cents(75));

    let grand = store.user("grand").unwrap();
    assert_eq!(grand.task_bonus, Money::ZERO);
    assert_eq!(grand.user_balance, Money::from_cents(1_250));

    // 4% and 6% of 12.50; referral counts only track deposits.
    let friend = store.user("friend").unwrap();
    assert_eq!(friend.referral_bonus_level1, Money::from_cents(50));
    assert_eq!(friend.level1, 0);
    let owner = store.user("owner").unwrap();
    assert_eq!(owner.referral_bonus_level2, Money::from_cents(75));
    assert_eq!(owner.level2, 0);

    assert_eq!(
        claim_task_bonus(&store, &task_request("grand"), &config, NOW + 1).await.unwrap(),
        TaskBonusClaim::NothingToClaim
    );
    assert_eq!(store.user("friend").unwrap().referral_bonus_level1, Money::from_cents(50));
}

#[tokio::test]
async fn earned_postbacks_become_claimable_task_bonus() {
    let store = task_tree();
    let url = adgem_url("uid=friend&payout=3&offer=77&transaction=ag-tx-9");
    let postback = verify_adgem_postback(&url, ADGEM_KEY).unwrap();
    credit_adgem_postback(&store, &postback, NOW).await.unwrap();

    let mut config = ReconcilerConfig::default();
    config.task_rates.level1 = Decimal::from_str("0.10").unwrap();
    let claim = claim_task_bonus(&store, &task_request("friend"), &config, NOW).await.unwrap();

    match claim {
        TaskBonusClaim::Claimed {
            amount,
            referral_credits,
            ..
        } => {
            assert_eq!(amount, Money::from_cents(150));
            assert_eq!(referral_credits.len(), 1);
            assert_eq!(referral_credits[0].referrer_id, "owner");
            assert_eq!(referral_credits[0].amount, Money::from_cents(15));
        }
        other => panic!("expected a claim, got {other:?}"),
    }
    assert_eq!(store.user("owner").unwrap().referral_bonus_level1, Money::from_cents(15));
}

#[tokio::test]
async fn task_bonus_for_unknown_user_is_not_found() {
    let store = task_tree();
    assert_eq!(
        claim_task_bonus(&store, &task_request("nobody"), &ReconcilerConfig::default(), NOW)
            .await
            .unwrap(),
        TaskBonusClaim::UserNotFound
    );
}

#[tokio::test]
async fn stale_task_bonus_commit_changes_nothing() {
    let store = task_tree();
    let stale = TaskBonusCommit {
        user_id: "grand".into(),
        amount: Money::from_cents(1_000),
        referral_credits: Vec::new(),
        claimed_at: NOW,
    };
    assert_eq!(store.claim_task_bonus(&stale).await, Err(StoreError::Conflict));

    let gone_referrer = TaskBonusCommit {
        amount: Money::from_cents(1_250),
        referral_credits: vec![ReferralCredit {
            referrer_id: "deleted".into(),
            level: ReferralLevel::Level1,
            amount: Money::from_cents(50),
        }],
        ..stale
    };
    assert_eq!(store.claim_task_bonus(&gone_referrer).await, Err(StoreError::Conflict));

    let grand = store.user("grand").unwrap();
    assert_eq!(grand.task_bonus, Money::from_cents(1_250));
    assert_eq!(grand.user_balance, Money::ZERO);
}

async fn funded(amount: &str) -> Reconciler<InMemoryStore, NoopNotifier> {
    let rec = Reconciler::new(
        store_with(&[("miner", "MINE", None)]),
        NoopNotifier,
        ReconcilerConfig::default(),
    );
    let event = json!({
        "transactionId": "tx-miner",
        "status": "confirmed",
        "amount": amount,
        "userId": "miner",
    });
    rec.process(&event, NOW).await.unwrap();
    rec
}

#[tokio::test]
async fn daily_profit_pays_once_per_day_until_the_plan_ends() {
    let rec = funded("100").await;
    let config = rec.config().clone();
    let store = rec.store();
    let request = profit_request("miner");

    assert_eq!(
        claim_daily_profit(store, &request, &config, NOW).await.unwrap(),
        ProfitClaim::Claimed {
            amount: Money::from_cents(480),
            balance: Money::from_cents(480),
            next_claim_at: NOW + CLAIM_INTERVAL_SECS,
        }
    );
    assert_eq!(
        claim_daily_profit(store, &request, &config, NOW + 3_600).await.unwrap(),
        ProfitClaim::TooSoon {
            next_claim_at: NOW + CLAIM_INTERVAL_SECS
        }
    );

    // The 100.00 plan runs 40 days: one claim per day, no more.
    for day in 1..40 {
        let at = NOW + day * CLAIM_INTERVAL_SECS;
        assert!(matches!(
            claim_daily_profit(store, &request, &config, at).await.unwrap(),
            ProfitClaim::Claimed { .. }
        ));
    }
    let end = NOW + 40 * CLAIM_INTERVAL_SECS;
    assert_eq!(
        claim_daily_profit(store, &request, &config, end).await.unwrap(),
        ProfitClaim::PlanExpired { expired_at: end }
    );

    let miner = store.user("miner").unwrap();
    assert_eq!(miner.user_balance, Money::from_cents(40 * 480));
    assert_eq!(miner.last_profit_claim, Some(NOW + 39 * CLAIM_INTERVAL_SECS));
}

#[tokio::test]
async fn daily_profit_needs_a_plan() {
    let rec = funded("1.50").await;
    let config = rec.config().clone();

    assert_eq!(
        claim_daily_profit(rec.store(), &profit_request("miner"), &config, NOW).await.unwrap(),
        ProfitClaim::NoActivePlan
    );
    assert_eq!(
        claim_daily_profit(rec.store(), &profit_request("ghost"), &config, NOW).await.unwrap(),
        ProfitClaim::UserNotFound
    );
    assert_eq!(rec.store().user("miner").unwrap().user_balance, Money::ZERO);
}

#[tokio::test]
async fn stale_profit_commit_is_a_conflict() {
    let rec = funded("100").await;
    claim_daily_profit(rec.store(), &profit_request("miner"), rec.config(), NOW)
        .await
        .unwrap();

    let replay = ProfitCommit {
        user_id: "miner".into(),
        expected_last_claim: None,
        amount: Money::from_cents(480),
        claimed_at: NOW + 1,
    };
    assert_eq!(rec.store().claim_daily_profit(&replay).await, Err(StoreError::Conflict));
    assert_eq!(rec.store().user("miner").unwrap().user_balance, Money::from_cents(480));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_profit_claims_pay_once() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_user(UserRecord {
        id: "miner".into(),
        referral_code: "MINE".into(),
        daily_profit: Money::from_cents(480),
        deposit_time: Some(NOW),
        plan_expires_at: Some(NOW + 40 * CLAIM_INTERVAL_SECS),
        ..Default::default()
    });
    let config = Arc::new(ReconcilerConfig::default());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                claim_daily_profit(store.as_ref(), &profit_request("miner"), &config, NOW + 10).await
            })
        })
        .collect();

    let mut claimed = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ProfitClaim::Claimed { .. } => claimed += 1,
            ProfitClaim::TooSoon { .. } => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(claimed, 1);
    assert_eq!(store.user("miner").unwrap().user_balance, Money::from_cents(480));
}
