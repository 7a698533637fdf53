use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApplicationId, Cents};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// Funds released to the borrower
    Disbursement,
    /// Funds returned by the borrower
    Repayment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Disbursement => "DISBURSEMENT",
            TransactionType::Repayment => "REPAYMENT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DISBURSEMENT" => Some(TransactionType::Disbursement),
            "REPAYMENT" => Some(TransactionType::Repayment),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One money movement on an application. Transactions are immutable and
/// append-only - the log is never rewritten, corrections happen through
/// further repayments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Monotonically increasing sequence number for ordering
    pub sequence: i64,
    pub application_id: ApplicationId,
    pub tx_type: TransactionType,
    pub amount_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction. Sequence number must be assigned by the repository.
    pub fn new(application_id: ApplicationId, tx_type: TransactionType, amount_cents: Cents) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0, // Will be set by repository
            application_id,
            tx_type,
            amount_cents,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_type_roundtrip() {
        for tt in [TransactionType::Disbursement, TransactionType::Repayment] {
            let parsed = TransactionType::from_str(tt.as_str()).unwrap();
            assert_eq!(tt, parsed);
        }
        assert_eq!(TransactionType::from_str("refund"), None);
    }

    #[test]
    fn test_new_transaction() {
        let app_id = Uuid::new_v4();
        let tx = Transaction::new(app_id, TransactionType::Disbursement, 100000);
        assert_eq!(tx.application_id, app_id);
        assert_eq!(tx.amount_cents, 100000);
        assert_eq!(tx.sequence, 0);
    }
}
