use thiserror::Error;

use crate::domain::{ApplicationState, Cents, TransitionError};

/// Error category surfaced alongside the message, for transport layers
/// that need to map failures onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    InvalidState,
    Internal,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Requested amount exceeds credit limit: limit {limit}, requested {requested}")]
    CreditLimitExceeded { limit: Cents, requested: Cents },

    #[error("Repayment amount exceeds outstanding balance: balance {balance}, requested {requested}")]
    RepaymentExceedsBalance { balance: Cents, requested: Cents },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot {operation} an application in state {state}")]
    InvalidState {
        operation: &'static str,
        state: ApplicationState,
    },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::UserNotFound(_) | AppError::ApplicationNotFound(_) => ErrorKind::NotFound,
            AppError::UserAlreadyExists(_)
            | AppError::CreditLimitExceeded { .. }
            | AppError::RepaymentExceedsBalance { .. }
            | AppError::InvalidAmount(_) => ErrorKind::Validation,
            AppError::InvalidState { .. } => ErrorKind::InvalidState,
            AppError::Database(_) => ErrorKind::Internal,
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidState { operation, state } => {
                AppError::InvalidState { operation, state }
            }
            TransitionError::ExceedsOutstandingBalance { balance, requested } => {
                AppError::RepaymentExceedsBalance { balance, requested }
            }
            TransitionError::NegativeRepayment { requested } => {
                AppError::InvalidAmount(format!("repayment amount {} is negative", requested))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AppError::UserNotFound("john.doe".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            AppError::CreditLimitExceeded {
                limit: 100000,
                requested: 150000,
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AppError::InvalidState {
                operation: "cancel",
                state: ApplicationState::Outstanding,
            }
            .kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_transition_error_mapping() {
        let err: AppError = TransitionError::InvalidState {
            operation: "disburse",
            state: ApplicationState::Repaid,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err: AppError = TransitionError::ExceedsOutstandingBalance {
            balance: 5000,
            requested: 6000,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
