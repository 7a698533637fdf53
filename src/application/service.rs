use tracing::info;

use crate::domain::{
    check_application, ApplicationId, Cents, CreditApplication, IntegrityIssue, IntegrityReport,
    Transaction, User,
};
use crate::storage::Repository;

use super::AppError;

/// The credit ledger: owns users, applications and transactions, and
/// enforces the application state machine and balance invariants. This is
/// the primary interface for any client (CLI, API, TUI, etc.).
pub struct CreditService {
    repo: Repository,
}

/// An application together with its ordered transaction history.
pub struct ApplicationHistory {
    pub application: CreditApplication,
    pub transactions: Vec<Transaction>,
}

/// Detailed application information for the single-application view.
pub struct ApplicationInfo {
    pub application: CreditApplication,
    pub user: User,
    pub transactions: Vec<Transaction>,
    pub total_disbursed: Cents,
    pub total_repaid: Cents,
}

impl CreditService {
    /// Create a new credit service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // User operations
    // ========================

    /// Provision a new user with a credit limit.
    pub async fn create_user(
        &self,
        username: String,
        credit_limit_cents: Cents,
    ) -> Result<User, AppError> {
        if credit_limit_cents < 0 {
            return Err(AppError::InvalidAmount(
                "credit limit must not be negative".to_string(),
            ));
        }
        if self.repo.get_user_by_username(&username).await?.is_some() {
            return Err(AppError::UserAlreadyExists(username));
        }

        let user = User::new(username, credit_limit_cents);
        self.repo.save_user(&user).await?;

        info!(username = %user.username, credit_limit_cents = user.credit_limit_cents, "user created");
        Ok(user)
    }

    /// Get a user by username.
    pub async fn get_user(&self, username: &str) -> Result<User, AppError> {
        self.repo
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))
    }

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.repo.list_users().await?)
    }

    // ========================
    // Application lifecycle
    // ========================

    /// Open a new credit application for a user.
    ///
    /// The requested amount is checked against the user's credit limit in
    /// isolation - other open or outstanding applications of the same user
    /// are not aggregated into the check.
    pub async fn create_application(
        &self,
        username: &str,
        requested_amount_cents: Cents,
        express_delivery: bool,
    ) -> Result<CreditApplication, AppError> {
        let user = self.get_user(username).await?;

        if !user.allows_request(requested_amount_cents) {
            return Err(AppError::CreditLimitExceeded {
                limit: user.credit_limit_cents,
                requested: requested_amount_cents,
            });
        }

        let application = CreditApplication::new(user.id, requested_amount_cents, express_delivery);
        self.repo.save_application(&application).await?;

        info!(
            application_id = %application.id,
            username = %user.username,
            requested_amount_cents = application.requested_amount_cents,
            "application created"
        );
        Ok(application)
    }

    /// Disburse the requested funds: OPEN -> OUTSTANDING.
    ///
    /// The DISBURSEMENT transaction and the application update are written
    /// in one atomic storage transaction; a failure leaves the application
    /// OPEN so the call can simply be retried.
    pub async fn disburse(&self, application_id: ApplicationId) -> Result<CreditApplication, AppError> {
        let mut application = self.fetch_application(application_id).await?;
        let mut transaction = application.disburse()?;

        self.repo
            .disburse_application(&application, &mut transaction)
            .await?;

        info!(
            application_id = %application.id,
            amount_cents = transaction.amount_cents,
            "funds disbursed"
        );
        Ok(application)
    }

    /// Repay part or all of an outstanding balance.
    ///
    /// Reaching exactly zero moves the application to REPAID. A zero amount
    /// is accepted and still appends a REPAYMENT transaction; a negative
    /// amount is refused.
    pub async fn repay(
        &self,
        application_id: ApplicationId,
        amount_cents: Cents,
    ) -> Result<CreditApplication, AppError> {
        let mut application = self.fetch_application(application_id).await?;
        let mut transaction = application.repay(amount_cents)?;

        self.repo.save_transaction(&mut transaction).await?;
        self.repo.update_application(&application).await?;

        info!(
            application_id = %application.id,
            amount_cents,
            outstanding_balance_cents = application.outstanding_balance_cents,
            state = %application.state,
            "repayment recorded"
        );
        Ok(application)
    }

    /// Cancel an application: OPEN -> CANCELLED. No transaction is recorded.
    pub async fn cancel(&self, application_id: ApplicationId) -> Result<CreditApplication, AppError> {
        let mut application = self.fetch_application(application_id).await?;
        application.cancel()?;
        self.repo.update_application(&application).await?;

        info!(application_id = %application.id, "application cancelled");
        Ok(application)
    }

    /// Reject an application: OPEN -> REJECTED. No transaction is recorded.
    pub async fn reject(&self, application_id: ApplicationId) -> Result<CreditApplication, AppError> {
        let mut application = self.fetch_application(application_id).await?;
        application.reject()?;
        self.repo.update_application(&application).await?;

        info!(application_id = %application.id, "application rejected");
        Ok(application)
    }

    async fn fetch_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<CreditApplication, AppError> {
        self.repo
            .get_application(application_id)
            .await?
            .ok_or_else(|| AppError::ApplicationNotFound(application_id.to_string()))
    }

    // ========================
    // Read operations
    // ========================

    /// All applications owned by a user, each with its ordered transaction
    /// history. The read path is lenient: an unknown user yields an empty
    /// list rather than an error.
    pub async fn get_user_applications(
        &self,
        username: &str,
    ) -> Result<Vec<ApplicationHistory>, AppError> {
        let Some(user) = self.repo.get_user_by_username(username).await? else {
            return Ok(Vec::new());
        };

        let applications = self.repo.list_applications_for_user(user.id).await?;
        let mut histories = Vec::with_capacity(applications.len());
        for application in applications {
            let transactions = self
                .repo
                .list_transactions_for_application(application.id)
                .await?;
            histories.push(ApplicationHistory {
                application,
                transactions,
            });
        }

        Ok(histories)
    }

    /// Detailed view of a single application.
    pub async fn get_application_info(
        &self,
        application_id: ApplicationId,
    ) -> Result<ApplicationInfo, AppError> {
        let application = self.fetch_application(application_id).await?;
        let user = self
            .repo
            .get_user(application.user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(application.user_id.to_string()))?;
        let transactions = self
            .repo
            .list_transactions_for_application(application.id)
            .await?;

        let total_disbursed = crate::domain::total_disbursed(&transactions);
        let total_repaid = crate::domain::total_repaid(&transactions);

        Ok(ApplicationInfo {
            application,
            user,
            transactions,
            total_disbursed,
            total_repaid,
        })
    }

    /// List every application in the ledger, in insertion order.
    pub async fn list_all_applications(&self) -> Result<Vec<CreditApplication>, AppError> {
        Ok(self.repo.list_applications().await?)
    }

    /// List every transaction in the ledger, in sequence order.
    pub async fn list_all_transactions(&self) -> Result<Vec<Transaction>, AppError> {
        Ok(self.repo.list_transactions().await?)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check ledger integrity and return a report.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.repo.get_integrity_stats().await?;

        let mut issues = Vec::new();
        if stats.has_sequence_gaps {
            issues.push(IntegrityIssue::SequenceGaps);
        }
        if stats.orphan_transactions > 0 {
            issues.push(IntegrityIssue::OrphanTransactions {
                count: stats.orphan_transactions,
            });
        }
        if stats.negative_amounts > 0 {
            issues.push(IntegrityIssue::NegativeAmounts {
                count: stats.negative_amounts,
            });
        }

        for application in self.repo.list_applications().await? {
            let transactions = self
                .repo
                .list_transactions_for_application(application.id)
                .await?;
            issues.extend(check_application(&application, &transactions));
        }

        Ok(IntegrityReport {
            user_count: stats.user_count,
            application_count: stats.application_count,
            transaction_count: stats.transaction_count,
            issues,
        })
    }
}
