//! Lending policy values.

use serde::{Deserialize, Serialize};

/// Numbers the lifecycle engine enforces
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingPolicy {
    /// Days between renting and the due date
    pub loan_period_days: u32,
    /// Days one extension pushes the due date back
    pub extension_days: u32,
    /// Active rentals a regular member may hold (admins are exempt)
    pub user_borrow_limit: u32,
    /// Extensions allowed per rental, `None` for unbounded
    pub max_extensions: Option<u32>,
}

impl LendingPolicy {
    /// Loan period used when nothing is configured
    pub const DEFAULT_LOAN_PERIOD_DAYS: u32 = 14;
    /// Extension length used when nothing is configured
    pub const DEFAULT_EXTENSION_DAYS: u32 = 14;
    /// Borrow limit used when nothing is configured
    pub const DEFAULT_USER_BORROW_LIMIT: u32 = 7;
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: Self::DEFAULT_LOAN_PERIOD_DAYS,
            extension_days: Self::DEFAULT_EXTENSION_DAYS,
            user_borrow_limit: Self::DEFAULT_USER_BORROW_LIMIT,
            max_extensions: None,
        }
    }
}
