pub mod admin;
pub mod admin_auth;
pub mod claims;
pub mod deposits;
pub mod postbacks;
pub mod referrals;
