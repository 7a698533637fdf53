use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, Transaction, TransactionType, UserId};

pub type ApplicationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicationState {
    /// Requested but not yet disbursed - the only initial state
    Open,
    /// Withdrawn by the borrower before disbursement
    Cancelled,
    /// Declined before disbursement
    Rejected,
    /// Funds disbursed, balance not yet fully repaid
    Outstanding,
    /// Balance repaid in full
    Repaid,
}

impl ApplicationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationState::Open => "OPEN",
            ApplicationState::Cancelled => "CANCELLED",
            ApplicationState::Rejected => "REJECTED",
            ApplicationState::Outstanding => "OUTSTANDING",
            ApplicationState::Repaid => "REPAID",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPEN" => Some(ApplicationState::Open),
            "CANCELLED" => Some(ApplicationState::Cancelled),
            "REJECTED" => Some(ApplicationState::Rejected),
            "OUTSTANDING" => Some(ApplicationState::Outstanding),
            "REPAID" => Some(ApplicationState::Repaid),
            _ => None,
        }
    }

    /// CANCELLED, REJECTED and REPAID accept no further transitions.
    /// OUTSTANDING only leaves via full repayment.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationState::Cancelled | ApplicationState::Rejected | ApplicationState::Repaid
        )
    }
}

impl std::fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One credit request and its lifecycle record.
///
/// Invariant: `0 <= outstanding_balance_cents <= requested_amount_cents`
/// holds after every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditApplication {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub state: ApplicationState,
    pub requested_amount_cents: Cents,
    pub outstanding_balance_cents: Cents,
    pub express_delivery: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditApplication {
    pub fn new(user_id: UserId, requested_amount_cents: Cents, express_delivery: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            state: ApplicationState::Open,
            requested_amount_cents,
            outstanding_balance_cents: 0,
            express_delivery,
            created_at: now,
            updated_at: now,
        }
    }

    /// Release the requested funds: OPEN -> OUTSTANDING, balance becomes the
    /// requested amount. Returns the DISBURSEMENT transaction to append;
    /// caller must persist both writes in one atomic unit.
    pub fn disburse(&mut self) -> Result<Transaction, TransitionError> {
        if self.state != ApplicationState::Open {
            return Err(TransitionError::InvalidState {
                operation: "disburse",
                state: self.state,
            });
        }

        self.state = ApplicationState::Outstanding;
        self.outstanding_balance_cents = self.requested_amount_cents;
        self.updated_at = Utc::now();

        Ok(Transaction::new(
            self.id,
            TransactionType::Disbursement,
            self.requested_amount_cents,
        ))
    }

    /// Pay back part or all of the balance. Reaching exactly zero moves the
    /// application to REPAID; any positive remainder keeps it OUTSTANDING.
    ///
    /// A zero amount is accepted: it changes nothing but still yields a
    /// REPAYMENT transaction for the log. Negative amounts are refused -
    /// they would push the balance above the requested amount.
    pub fn repay(&mut self, amount_cents: Cents) -> Result<Transaction, TransitionError> {
        if self.state != ApplicationState::Outstanding {
            return Err(TransitionError::InvalidState {
                operation: "repay",
                state: self.state,
            });
        }
        if amount_cents < 0 {
            return Err(TransitionError::NegativeRepayment {
                requested: amount_cents,
            });
        }
        if amount_cents > self.outstanding_balance_cents {
            return Err(TransitionError::ExceedsOutstandingBalance {
                balance: self.outstanding_balance_cents,
                requested: amount_cents,
            });
        }

        self.outstanding_balance_cents -= amount_cents;
        self.state = if self.outstanding_balance_cents == 0 {
            ApplicationState::Repaid
        } else {
            ApplicationState::Outstanding
        };
        self.updated_at = Utc::now();

        Ok(Transaction::new(
            self.id,
            TransactionType::Repayment,
            amount_cents,
        ))
    }

    /// OPEN -> CANCELLED. No transaction is recorded.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        if self.state != ApplicationState::Open {
            return Err(TransitionError::InvalidState {
                operation: "cancel",
                state: self.state,
            });
        }
        self.state = ApplicationState::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// OPEN -> REJECTED. No transaction is recorded.
    pub fn reject(&mut self) -> Result<(), TransitionError> {
        if self.state != ApplicationState::Open {
            return Err(TransitionError::InvalidState {
                operation: "reject",
                state: self.state,
            });
        }
        self.state = ApplicationState::Rejected;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    InvalidState {
        operation: &'static str,
        state: ApplicationState,
    },
    ExceedsOutstandingBalance {
        balance: Cents,
        requested: Cents,
    },
    NegativeRepayment {
        requested: Cents,
    },
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::InvalidState { operation, state } => {
                write!(f, "Cannot {} an application in state {}", operation, state)
            }
            TransitionError::ExceedsOutstandingBalance { balance, requested } => {
                write!(
                    f,
                    "Repayment of {} cents exceeds outstanding balance of {} cents",
                    requested, balance
                )
            }
            TransitionError::NegativeRepayment { requested } => {
                write!(f, "Repayment amount must not be negative ({})", requested)
            }
        }
    }
}

impl std::error::Error for TransitionError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_application(amount: Cents) -> CreditApplication {
        CreditApplication::new(Uuid::new_v4(), amount, false)
    }

    #[test]
    fn test_new_application_starts_open_with_zero_balance() {
        let app = open_application(100000);
        assert_eq!(app.state, ApplicationState::Open);
        assert_eq!(app.outstanding_balance_cents, 0);
        assert_eq!(app.requested_amount_cents, 100000);
    }

    #[test]
    fn test_disburse_moves_to_outstanding() {
        let mut app = open_application(100000);
        let tx = app.disburse().unwrap();

        assert_eq!(app.state, ApplicationState::Outstanding);
        assert_eq!(app.outstanding_balance_cents, 100000);
        assert_eq!(tx.tx_type, TransactionType::Disbursement);
        assert_eq!(tx.amount_cents, 100000);
        assert_eq!(tx.application_id, app.id);
    }

    #[test]
    fn test_disburse_fails_outside_open() {
        let into_non_open_state: [fn(&mut CreditApplication); 3] = [
            |a| {
                a.cancel().unwrap();
            },
            |a| {
                a.reject().unwrap();
            },
            |a| {
                a.disburse().unwrap();
            },
        ];

        for mutate in into_non_open_state {
            let mut app = open_application(5000);
            mutate(&mut app);
            assert!(matches!(
                app.disburse(),
                Err(TransitionError::InvalidState { operation: "disburse", .. })
            ));
        }
    }

    #[test]
    fn test_partial_repayment_keeps_outstanding() {
        let mut app = open_application(100000);
        app.disburse().unwrap();

        let tx = app.repay(40000).unwrap();
        assert_eq!(app.state, ApplicationState::Outstanding);
        assert_eq!(app.outstanding_balance_cents, 60000);
        assert_eq!(tx.tx_type, TransactionType::Repayment);
        assert_eq!(tx.amount_cents, 40000);
    }

    #[test]
    fn test_full_repayment_moves_to_repaid() {
        let mut app = open_application(100000);
        app.disburse().unwrap();
        app.repay(40000).unwrap();
        app.repay(60000).unwrap();

        assert_eq!(app.state, ApplicationState::Repaid);
        assert_eq!(app.outstanding_balance_cents, 0);
    }

    #[test]
    fn test_repay_more_than_balance_fails() {
        let mut app = open_application(100000);
        app.disburse().unwrap();

        let err = app.repay(100001).unwrap_err();
        assert_eq!(
            err,
            TransitionError::ExceedsOutstandingBalance {
                balance: 100000,
                requested: 100001,
            }
        );
        // Balance untouched on failure
        assert_eq!(app.outstanding_balance_cents, 100000);
    }

    #[test]
    fn test_zero_repayment_is_accepted_and_logged() {
        let mut app = open_application(100000);
        app.disburse().unwrap();

        let tx = app.repay(0).unwrap();
        assert_eq!(app.state, ApplicationState::Outstanding);
        assert_eq!(app.outstanding_balance_cents, 100000);
        assert_eq!(tx.amount_cents, 0);
    }

    #[test]
    fn test_negative_repayment_is_refused() {
        let mut app = open_application(100000);
        app.disburse().unwrap();

        assert!(matches!(
            app.repay(-1),
            Err(TransitionError::NegativeRepayment { requested: -1 })
        ));
    }

    #[test]
    fn test_repay_requires_outstanding() {
        let mut app = open_application(100000);
        assert!(matches!(
            app.repay(1000),
            Err(TransitionError::InvalidState { operation: "repay", .. })
        ));
    }

    #[test]
    fn test_cancel_and_reject_only_from_open() {
        let mut app = open_application(5000);
        app.cancel().unwrap();
        assert_eq!(app.state, ApplicationState::Cancelled);
        assert!(app.reject().is_err());

        let mut app = open_application(5000);
        app.reject().unwrap();
        assert_eq!(app.state, ApplicationState::Rejected);
        assert!(app.cancel().is_err());

        let mut app = open_application(5000);
        app.disburse().unwrap();
        assert!(app.cancel().is_err());
        assert!(app.reject().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ApplicationState::Open.is_terminal());
        assert!(!ApplicationState::Outstanding.is_terminal());
        assert!(ApplicationState::Cancelled.is_terminal());
        assert!(ApplicationState::Rejected.is_terminal());
        assert!(ApplicationState::Repaid.is_terminal());
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            ApplicationState::Open,
            ApplicationState::Cancelled,
            ApplicationState::Rejected,
            ApplicationState::Outstanding,
            ApplicationState::Repaid,
        ] {
            assert_eq!(ApplicationState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(ApplicationState::from_str("CLOSED"), None);
    }
}
