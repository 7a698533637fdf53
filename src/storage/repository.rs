use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    ApplicationId, ApplicationState, CreditApplication, Transaction, TransactionType, User, UserId,
};

use super::MIGRATION_001_INITIAL;

/// Raw counters for ledger integrity verification.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub user_count: i64,
    pub application_count: i64,
    pub transaction_count: i64,
    pub has_sequence_gaps: bool,
    pub orphan_transactions: i64,
    pub negative_amounts: i64,
}

/// Repository for persisting and querying users, applications and transactions.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given path.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // User operations
    // ========================

    /// Save a new user to the database.
    pub async fn save_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, credit_limit_cents, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(user.credit_limit_cents)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save user")?;
        Ok(())
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, credit_limit_cents, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a user by unique username.
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, credit_limit_cents, created_at, updated_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by username")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT id, username, credit_limit_cents, created_at, updated_at
            FROM users
            ORDER BY username
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(User {
            id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
            username: row.get("username"),
            credit_limit_cents: row.get("credit_limit_cents"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                .context("Invalid updated_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Application operations
    // ========================

    /// Save a new application to the database.
    pub async fn save_application(&self, application: &CreditApplication) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO applications (id, user_id, state, requested_amount_cents, outstanding_balance_cents, express_delivery, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(application.id.to_string())
        .bind(application.user_id.to_string())
        .bind(application.state.as_str())
        .bind(application.requested_amount_cents)
        .bind(application.outstanding_balance_cents)
        .bind(application.express_delivery)
        .bind(application.created_at.to_rfc3339())
        .bind(application.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save application")?;
        Ok(())
    }

    /// Get an application by ID.
    pub async fn get_application(&self, id: ApplicationId) -> Result<Option<CreditApplication>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, state, requested_amount_cents, outstanding_balance_cents, express_delivery, created_at, updated_at
            FROM applications
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch application")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_application(&row)?)),
            None => Ok(None),
        }
    }

    /// Persist the mutable fields of an application (state, balance, updated_at).
    pub async fn update_application(&self, application: &CreditApplication) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE applications
            SET state = ?, outstanding_balance_cents = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(application.state.as_str())
        .bind(application.outstanding_balance_cents)
        .bind(application.updated_at.to_rfc3339())
        .bind(application.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update application")?;
        Ok(())
    }

    /// List all applications owned by a user, in insertion order.
    pub async fn list_applications_for_user(&self, user_id: UserId) -> Result<Vec<CreditApplication>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, state, requested_amount_cents, outstanding_balance_cents, express_delivery, created_at, updated_at
            FROM applications
            WHERE user_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list applications for user")?;

        rows.iter().map(Self::row_to_application).collect()
    }

    /// List all applications.
    pub async fn list_applications(&self) -> Result<Vec<CreditApplication>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, state, requested_amount_cents, outstanding_balance_cents, express_delivery, created_at, updated_at
            FROM applications
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list applications")?;

        rows.iter().map(Self::row_to_application).collect()
    }

    fn row_to_application(row: &sqlx::sqlite::SqliteRow) -> Result<CreditApplication> {
        let id_str: String = row.get("id");
        let user_id_str: String = row.get("user_id");
        let state_str: String = row.get("state");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(CreditApplication {
            id: Uuid::parse_str(&id_str).context("Invalid application ID")?,
            user_id: Uuid::parse_str(&user_id_str).context("Invalid user ID")?,
            state: ApplicationState::from_str(&state_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid application state: {}", state_str))?,
            requested_amount_cents: row.get("requested_amount_cents"),
            outstanding_balance_cents: row.get("outstanding_balance_cents"),
            express_delivery: row.get::<i32, _>("express_delivery") != 0,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                .context("Invalid updated_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Transaction operations
    // ========================

    /// Save a new transaction to the database.
    /// Automatically assigns the next sequence number.
    pub async fn save_transaction(&self, transaction: &mut Transaction) -> Result<()> {
        let sequence = self.next_sequence().await?;
        transaction.sequence = sequence;

        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, application_id, tx_type, amount_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.application_id.to_string())
        .bind(transaction.tx_type.as_str())
        .bind(transaction.amount_cents)
        .bind(transaction.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save transaction")?;

        Ok(())
    }

    /// Get the next sequence number and increment the counter.
    async fn next_sequence(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }

    /// Persist a disbursement as one atomic unit: the DISBURSEMENT
    /// transaction and the application update commit together or not at all.
    /// On failure the stored application keeps its prior state.
    pub async fn disburse_application(
        &self,
        application: &CreditApplication,
        transaction: &mut Transaction,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin disbursement transaction")?;

        let sequence: i64 = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .context("Failed to get next sequence number")?
        .get("value");
        transaction.sequence = sequence;

        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, application_id, tx_type, amount_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.application_id.to_string())
        .bind(transaction.tx_type.as_str())
        .bind(transaction.amount_cents)
        .bind(transaction.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to save disbursement transaction")?;

        sqlx::query(
            r#"
            UPDATE applications
            SET state = ?, outstanding_balance_cents = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(application.state.as_str())
        .bind(application.outstanding_balance_cents)
        .bind(application.updated_at.to_rfc3339())
        .bind(application.id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to update disbursed application")?;

        tx.commit()
            .await
            .context("Failed to commit disbursement")?;

        Ok(())
    }

    /// List transactions for an application, ordered by sequence number.
    pub async fn list_transactions_for_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, application_id, tx_type, amount_cents, created_at
            FROM transactions
            WHERE application_id = ?
            ORDER BY sequence
            "#,
        )
        .bind(application_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions for application")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// List all transactions, ordered by sequence number.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, application_id, tx_type, amount_cents, created_at
            FROM transactions
            ORDER BY sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let application_id_str: String = row.get("application_id");
        let tx_type_str: String = row.get("tx_type");
        let created_at_str: String = row.get("created_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            sequence: row.get("sequence"),
            application_id: Uuid::parse_str(&application_id_str)
                .context("Invalid application ID")?,
            tx_type: TransactionType::from_str(&tx_type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", tx_type_str))?,
            amount_cents: row.get("amount_cents"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Integrity operations
    // ========================

    /// Get raw statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let user_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let application_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM applications")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let sequence_check = sqlx::query(
            r#"
            SELECT
                MIN(sequence) as min_seq,
                MAX(sequence) as max_seq,
                COUNT(*) as count
            FROM transactions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let min_seq: Option<i64> = sequence_check.get("min_seq");
        let max_seq: Option<i64> = sequence_check.get("max_seq");
        let transaction_count: i64 = sequence_check.get("count");

        let has_sequence_gaps = match (min_seq, max_seq) {
            (Some(min), Some(max)) => (max - min + 1) != transaction_count,
            _ => false,
        };

        let orphan_transactions: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM transactions t
            WHERE NOT EXISTS (SELECT 1 FROM applications a WHERE a.id = t.application_id)
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        // Zero-amount repayments are legal, negative amounts never are
        let negative_amounts: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM transactions
            WHERE amount_cents < 0
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        Ok(IntegrityStats {
            user_count,
            application_count,
            transaction_count,
            has_sequence_gaps,
            orphan_transactions,
            negative_amounts,
        })
    }
}
