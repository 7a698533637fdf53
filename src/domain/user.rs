use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type UserId = Uuid;

/// A borrower. The credit limit caps the requested amount of any single
/// application; it is not an aggregate across applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub credit_limit_cents: Cents,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, credit_limit_cents: Cents) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            credit_limit_cents,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if a single application for this amount fits the limit.
    pub fn allows_request(&self, requested_amount_cents: Cents) -> bool {
        requested_amount_cents <= self.credit_limit_cents
    }
}
