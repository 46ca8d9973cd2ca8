//! AdGem offer-wall postbacks.
//!
//! AdGem signs the full postback URL with HMAC-SHA256 and appends the hex digest as
//! `verifier`. A verified postback credits half of its payout to the user's task
//! bonus, once per AdGem transaction id.

use rust_decimal::Decimal;
use thiserror::Error;
use url::Url;

use crate::error::StoreError;
use crate::money::Money;
use crate::signature::verify_hex;
use crate::store::{LedgerStore, PostbackCredit, PostbackOutcome};

const VERIFIER_PARAM: &str = "verifier";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostbackError {
    #[error("postback url is invalid: {0}")]
    InvalidUrl(String),
    #[error("missing verifier")]
    MissingVerifier,
    #[error("invalid verifier")]
    InvalidVerifier,
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),
    #[error("invalid payout `{0}`")]
    InvalidPayout(String),
}

impl PostbackError {
    pub fn status_code(&self) -> u16 {
        match self {
            PostbackError::MissingVerifier | PostbackError::InvalidVerifier => 422,
            PostbackError::InvalidUrl(_)
            | PostbackError::MissingParameter(_)
            | PostbackError::InvalidPayout(_) => 400,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PostbackError::InvalidUrl(_) => "invalid_url",
            PostbackError::MissingVerifier => "missing_verifier",
            PostbackError::InvalidVerifier => "invalid_verifier",
            PostbackError::MissingParameter(_) => "missing_parameter",
            PostbackError::InvalidPayout(_) => "invalid_payout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdgemPostback {
    pub transaction_id: String,
    pub user_id: String,
    pub offer: String,
    pub payout: Money,
}

impl AdgemPostback {
    /// The user's share: half the payout, rounded to cents.
    pub fn credit(&self) -> Option<Money> {
        self.payout.scale(Decimal::new(5, 1))
    }
}

/// Check the `verifier` signature of `full_url` and extract the postback fields.
pub fn verify_adgem_postback(full_url: &str, key: &[u8]) -> Result<AdgemPostback, PostbackError> {
    let mut url = Url::parse(full_url).map_err(|e| PostbackError::InvalidUrl(e.to_string()))?;

    let verifier = url
        .query_pairs()
        .find(|(k, _)| k == VERIFIER_PARAM)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or(PostbackError::MissingVerifier)?;

    let params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != VERIFIER_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    // The signature covers the URL exactly as it reads without the verifier.
    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params.iter());
    }

    if !verify_hex(key, url.as_str().as_bytes(), &verifier) {
        return Err(PostbackError::InvalidVerifier);
    }

    let param = |name: &'static str| {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(PostbackError::MissingParameter(name))
    };

    let user_id = param("uid")?;
    let raw_payout = param("payout")?;
    let offer = param("offer")?;
    let transaction_id = param("transaction")?;

    let payout = Money::parse(&raw_payout)
        .ok()
        .filter(|p| p.is_positive())
        .ok_or(PostbackError::InvalidPayout(raw_payout))?;

    Ok(AdgemPostback {
        transaction_id,
        user_id,
        offer,
        payout,
    })
}

/// Credit a verified postback, once per transaction id.
pub async fn credit_adgem_postback<S>(
    store: &S,
    postback: &AdgemPostback,
    now: i64,
) -> Result<PostbackOutcome, StoreError>
where
    S: LedgerStore + ?Sized,
{
    let credit = postback
        .credit()
        .ok_or_else(|| StoreError::Backend("postback payout overflow".to_string()))?;

    store
        .credit_postback(&PostbackCredit {
            transaction_id: postback.transaction_id.clone(),
            user_id: postback.user_id.clone(),
            offer: postback.offer.clone(),
            payout: postback.payout,
            credit,
            created_at: now,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sign_hex;

    const KEY: &[u8] = b"adgem-secret";

    fn signed(base: &str) -> String {
        let sig = sign_hex(KEY, base.as_bytes()).unwrap();
        format!("{base}&verifier={sig}")
    }

    #[test]
    fn accepts_correctly_signed_url() {
        let url = signed("https://api.example.com/api/postbacks/adgem?uid=user-1&payout=3.00&offer=42&transaction=ag-9");
        let postback = verify_adgem_postback(&url, KEY).unwrap();

        assert_eq!(postback.user_id, "user-1");
        assert_eq!(postback.offer, "42");
        assert_eq!(postback.transaction_id, "ag-9");
        assert_eq!(postback.payout, Money::from_cents(300));
        assert_eq!(postback.credit(), Some(Money::from_cents(150)));
    }

    #[test]
    fn verifier_position_does_not_matter() {
        let base = "https://api.example.com/api/postbacks/adgem?uid=u&payout=1&offer=o&transaction=t";
        let sig = sign_hex(KEY, base.as_bytes()).unwrap();
        let url = format!(
            "https://api.example.com/api/postbacks/adgem?verifier={sig}&uid=u&payout=1&offer=o&transaction=t"
        );
        assert!(verify_adgem_postback(&url, KEY).is_ok());
    }

    #[test]
    fn rejects_tampering_and_missing_verifier() {
        let url = signed("https://api.example.com/api/postbacks/adgem?uid=u&payout=1&offer=o&transaction=t");
        let tampered = url.replace("payout=1", "payout=100");
        assert_eq!(verify_adgem_postback(&tampered, KEY), Err(PostbackError::InvalidVerifier));
        assert_eq!(verify_adgem_postback(&url, b"wrong"), Err(PostbackError::InvalidVerifier));

        let unsigned = "https://api.example.com/api/postbacks/adgem?uid=u&payout=1&offer=o&transaction=t";
        assert_eq!(verify_adgem_postback(unsigned, KEY), Err(PostbackError::MissingVerifier));
        assert_eq!(PostbackError::MissingVerifier.status_code(), 422);
    }

    #[test]
    fn requires_all_parameters() {
        let url = signed("https://api.example.com/api/postbacks/adgem?uid=u&payout=1&offer=o");
        assert_eq!(
            verify_adgem_postback(&url, KEY),
            Err(PostbackError::MissingParameter("transaction"))
        );

        let zero = signed("https://api.example.com/api/postbacks/adgem?uid=u&payout=0&offer=o&transaction=t");
        assert!(matches!(verify_adgem_postback(&zero, KEY), Err(PostbackError::InvalidPayout(_))));
        assert_eq!(PostbackError::MissingParameter("uid").status_code(), 400);
    }
}
