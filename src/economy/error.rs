//! Economy errors.

use thiserror::Error;

use crate::game::action::ActionError;
use crate::ledger::StoreError;
use crate::network::auth::AuthError;
use crate::network::protocol::ErrorCode;

/// Reasons an economy operation fails. A failed operation mutates nothing
/// after the failing step and broadcasts nothing.
#[derive(Debug, Error)]
pub enum EconomyError {
    /// Malformed action or config patch.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Point consumption denied; balance unchanged.
    #[error("insufficient balance: {balance} < {cost}")]
    InsufficientBalance {
        /// Balance at the time of the attempt.
        balance: u64,
        /// Requested cost.
        cost: u64,
    },

    /// Ledger or leaderboard backend failed.
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    /// Admin operation without a valid credential.
    #[error("forbidden: {0}")]
    Forbidden(#[from] AuthError),
}

impl From<ActionError> for EconomyError {
    fn from(err: ActionError) -> Self {
        EconomyError::InvalidInput(err.to_string())
    }
}

impl EconomyError {
    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            EconomyError::InvalidInput(_) => ErrorCode::InvalidInput,
            EconomyError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            EconomyError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            EconomyError::Forbidden(_) => ErrorCode::Forbidden,
        }
    }
}
