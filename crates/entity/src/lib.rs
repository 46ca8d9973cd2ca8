pub mod user;
pub mod payment;
pub mod deposit_log;
pub mod deposit_error;
pub mod postback_log;

pub use user::Entity as User;
pub use payment::Entity as Payment;
pub use deposit_log::Entity as DepositLog;
pub use deposit_error::Entity as DepositError;
pub use postback_log::Entity as PostbackLog;
