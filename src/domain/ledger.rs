use super::{ApplicationId, ApplicationState, Cents, CreditApplication, Transaction, TransactionType};

/// Sum of disbursements recorded for an application.
pub fn total_disbursed(transactions: &[Transaction]) -> Cents {
    transactions
        .iter()
        .filter(|t| t.tx_type == TransactionType::Disbursement)
        .map(|t| t.amount_cents)
        .sum()
}

/// Sum of repayments recorded for an application.
pub fn total_repaid(transactions: &[Transaction]) -> Cents {
    transactions
        .iter()
        .filter(|t| t.tx_type == TransactionType::Repayment)
        .map(|t| t.amount_cents)
        .sum()
}

/// Recompute the outstanding balance from the transaction log alone.
/// Balance = disbursed - repaid. For an application with no transactions
/// this is 0, which matches every pre-disbursement state.
pub fn derived_outstanding(transactions: &[Transaction]) -> Cents {
    total_disbursed(transactions) - total_repaid(transactions)
}

/// Cross-check one application's stored state against its transaction log.
/// Returns every inconsistency found, empty when the record is sound.
pub fn check_application(
    application: &CreditApplication,
    transactions: &[Transaction],
) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();

    if application.outstanding_balance_cents < 0
        || application.outstanding_balance_cents > application.requested_amount_cents
    {
        issues.push(IntegrityIssue::BalanceOutOfRange {
            application_id: application.id,
            balance: application.outstanding_balance_cents,
            requested: application.requested_amount_cents,
        });
    }

    match application.state {
        ApplicationState::Open | ApplicationState::Cancelled | ApplicationState::Rejected => {
            // Nothing was ever disbursed: no log entries, no balance.
            if !transactions.is_empty() {
                issues.push(IntegrityIssue::UnexpectedTransactions {
                    application_id: application.id,
                    state: application.state,
                    count: transactions.len(),
                });
            }
            if application.outstanding_balance_cents != 0 {
                issues.push(IntegrityIssue::BalanceMismatch {
                    application_id: application.id,
                    stored: application.outstanding_balance_cents,
                    derived: 0,
                });
            }
        }
        ApplicationState::Outstanding | ApplicationState::Repaid => {
            let derived = derived_outstanding(transactions);
            if application.outstanding_balance_cents != derived {
                issues.push(IntegrityIssue::BalanceMismatch {
                    application_id: application.id,
                    stored: application.outstanding_balance_cents,
                    derived,
                });
            }
            if application.state == ApplicationState::Repaid
                && application.outstanding_balance_cents != 0
            {
                issues.push(IntegrityIssue::RepaidWithBalance {
                    application_id: application.id,
                    balance: application.outstanding_balance_cents,
                });
            }
        }
    }

    issues
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// Transaction sequence numbers are not contiguous
    SequenceGaps,
    /// Transactions referencing no known application
    OrphanTransactions { count: i64 },
    /// Transactions with a negative amount
    NegativeAmounts { count: i64 },
    /// Stored balance disagrees with the transaction log
    BalanceMismatch {
        application_id: ApplicationId,
        stored: Cents,
        derived: Cents,
    },
    /// Balance outside [0, requested_amount]
    BalanceOutOfRange {
        application_id: ApplicationId,
        balance: Cents,
        requested: Cents,
    },
    /// A REPAID application still carrying a balance
    RepaidWithBalance {
        application_id: ApplicationId,
        balance: Cents,
    },
    /// Log entries on an application that was never disbursed
    UnexpectedTransactions {
        application_id: ApplicationId,
        state: ApplicationState,
        count: usize,
    },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::SequenceGaps => {
                write!(f, "transaction sequence numbers have gaps")
            }
            IntegrityIssue::OrphanTransactions { count } => {
                write!(f, "{} transaction(s) reference a missing application", count)
            }
            IntegrityIssue::NegativeAmounts { count } => {
                write!(f, "{} transaction(s) have a negative amount", count)
            }
            IntegrityIssue::BalanceMismatch {
                application_id,
                stored,
                derived,
            } => write!(
                f,
                "application {}: stored balance {} disagrees with transaction log ({})",
                application_id, stored, derived
            ),
            IntegrityIssue::BalanceOutOfRange {
                application_id,
                balance,
                requested,
            } => write!(
                f,
                "application {}: balance {} outside [0, {}]",
                application_id, balance, requested
            ),
            IntegrityIssue::RepaidWithBalance {
                application_id,
                balance,
            } => write!(
                f,
                "application {}: REPAID but balance is {}",
                application_id, balance
            ),
            IntegrityIssue::UnexpectedTransactions {
                application_id,
                state,
                count,
            } => write!(
                f,
                "application {}: {} transaction(s) despite state {}",
                application_id, count, state
            ),
        }
    }
}

/// Ledger-wide integrity report.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub user_count: i64,
    pub application_count: i64,
    pub transaction_count: i64,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn app_in(state: ApplicationState, requested: Cents, balance: Cents) -> CreditApplication {
        let mut app = CreditApplication::new(Uuid::new_v4(), requested, false);
        app.state = state;
        app.outstanding_balance_cents = balance;
        app
    }

    fn tx(app: &CreditApplication, tx_type: TransactionType, amount: Cents) -> Transaction {
        Transaction::new(app.id, tx_type, amount)
    }

    #[test]
    fn test_derived_outstanding_from_log() {
        let app = app_in(ApplicationState::Outstanding, 100000, 60000);
        let log = vec![
            tx(&app, TransactionType::Disbursement, 100000),
            tx(&app, TransactionType::Repayment, 40000),
        ];

        assert_eq!(total_disbursed(&log), 100000);
        assert_eq!(total_repaid(&log), 40000);
        assert_eq!(derived_outstanding(&log), 60000);
    }

    #[test]
    fn test_check_clean_outstanding_application() {
        let app = app_in(ApplicationState::Outstanding, 100000, 60000);
        let log = vec![
            tx(&app, TransactionType::Disbursement, 100000),
            tx(&app, TransactionType::Repayment, 40000),
        ];

        assert!(check_application(&app, &log).is_empty());
    }

    #[test]
    fn test_check_clean_open_application() {
        let app = app_in(ApplicationState::Open, 100000, 0);
        assert!(check_application(&app, &[]).is_empty());
    }

    #[test]
    fn test_check_flags_balance_mismatch() {
        let app = app_in(ApplicationState::Outstanding, 100000, 50000);
        let log = vec![tx(&app, TransactionType::Disbursement, 100000)];

        let issues = check_application(&app, &log);
        assert_eq!(
            issues,
            vec![IntegrityIssue::BalanceMismatch {
                application_id: app.id,
                stored: 50000,
                derived: 100000,
            }]
        );
    }

    #[test]
    fn test_check_flags_balance_out_of_range() {
        let app = app_in(ApplicationState::Outstanding, 100000, 100001);
        let log = vec![tx(&app, TransactionType::Disbursement, 100001)];

        let issues = check_application(&app, &log);
        assert!(issues.contains(&IntegrityIssue::BalanceOutOfRange {
            application_id: app.id,
            balance: 100001,
            requested: 100000,
        }));
    }

    #[test]
    fn test_check_flags_transactions_on_open_application() {
        let app = app_in(ApplicationState::Open, 100000, 0);
        let log = vec![tx(&app, TransactionType::Disbursement, 100000)];

        let issues = check_application(&app, &log);
        assert_eq!(
            issues,
            vec![IntegrityIssue::UnexpectedTransactions {
                application_id: app.id,
                state: ApplicationState::Open,
                count: 1,
            }]
        );
    }

    #[test]
    fn test_check_flags_repaid_with_balance() {
        let app = app_in(ApplicationState::Repaid, 100000, 1);
        let log = vec![
            tx(&app, TransactionType::Disbursement, 100000),
            tx(&app, TransactionType::Repayment, 99999),
        ];

        let issues = check_application(&app, &log);
        assert!(issues.contains(&IntegrityIssue::RepaidWithBalance {
            application_id: app.id,
            balance: 1,
        }));
    }
}
