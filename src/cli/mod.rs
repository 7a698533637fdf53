use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{ApplicationInfo, CreditService};
use crate::domain::{format_cents, parse_cents, ApplicationId, Transaction};

/// Credito - Line-of-Credit Ledger
#[derive(Parser)]
#[command(name = "credito")]
#[command(about = "A line-of-credit ledger for managing credit applications")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "credito.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User provisioning commands
    #[command(subcommand)]
    User(UserCommands),

    /// Open a new credit application
    Apply {
        /// Requested amount (e.g., "1000.00" or "1000")
        amount: String,

        /// Username of the borrower
        #[arg(long)]
        user: String,

        /// Request express delivery of the funds
        #[arg(long)]
        express: bool,
    },

    /// Disburse the requested funds for an open application
    Disburse {
        /// Application ID
        id: String,
    },

    /// Repay part or all of an outstanding balance
    Repay {
        /// Application ID
        id: String,

        /// Repayment amount (e.g., "400.00" or "400")
        amount: String,
    },

    /// Cancel an open application
    Cancel {
        /// Application ID
        id: String,
    },

    /// Reject an open application
    Reject {
        /// Application ID
        id: String,
    },

    /// List a user's applications with their transaction history
    Applications {
        /// Username
        username: String,
    },

    /// Show detailed application information
    Show {
        /// Application ID
        id: String,
    },

    /// Verify ledger integrity
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: applications, transactions, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Provision a new user
    Add {
        /// Username (must be unique)
        username: String,

        /// Credit limit (e.g., "1000.00" or "1000")
        credit_limit: String,
    },

    /// List all users
    List,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        if self.verbose {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("credito=info")),
                )
                .with_writer(std::io::stderr)
                .init();
        }

        match self.command {
            Commands::Init => {
                CreditService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::User(user_cmd) => {
                let service = CreditService::connect(&self.database).await?;
                run_user_command(&service, user_cmd).await?;
            }

            Commands::Apply {
                amount,
                user,
                express,
            } => {
                let service = CreditService::connect(&self.database).await?;
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '1000.00' or '1000'")?;

                let application = service.create_application(&user, amount_cents, express).await?;

                println!(
                    "Created application: {} for {} ({})",
                    format_cents(application.requested_amount_cents),
                    user,
                    application.id
                );
            }

            Commands::Disburse { id } => {
                let service = CreditService::connect(&self.database).await?;
                let application = service.disburse(parse_application_id(&id)?).await?;

                println!(
                    "Disbursed {}: application {} is now {}",
                    format_cents(application.requested_amount_cents),
                    application.id,
                    application.state
                );
            }

            Commands::Repay { id, amount } => {
                let service = CreditService::connect(&self.database).await?;
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '400.00' or '400'")?;

                let application = service.repay(parse_application_id(&id)?, amount_cents).await?;

                if application.outstanding_balance_cents == 0 {
                    println!(
                        "Repaid {}: application {} fully repaid",
                        format_cents(amount_cents),
                        application.id
                    );
                } else {
                    println!(
                        "Repaid {}: outstanding balance {}",
                        format_cents(amount_cents),
                        format_cents(application.outstanding_balance_cents)
                    );
                }
            }

            Commands::Cancel { id } => {
                let service = CreditService::connect(&self.database).await?;
                let application = service.cancel(parse_application_id(&id)?).await?;
                println!("Cancelled application: {}", application.id);
            }

            Commands::Reject { id } => {
                let service = CreditService::connect(&self.database).await?;
                let application = service.reject(parse_application_id(&id)?).await?;
                println!("Rejected application: {}", application.id);
            }

            Commands::Applications { username } => {
                let service = CreditService::connect(&self.database).await?;
                run_applications_command(&service, &username).await?;
            }

            Commands::Show { id } => {
                let service = CreditService::connect(&self.database).await?;
                let info = service.get_application_info(parse_application_id(&id)?).await?;
                print_application_info(&info);
            }

            Commands::Check => {
                let service = CreditService::connect(&self.database).await?;
                run_check_command(&service).await?;
            }

            Commands::Export {
                export_type,
                output,
            } => {
                let service = CreditService::connect(&self.database).await?;
                run_export_command(&service, &export_type, output.as_deref()).await?;
            }
        }

        Ok(())
    }
}

fn parse_application_id(id: &str) -> Result<ApplicationId> {
    Uuid::parse_str(id).context("Invalid application ID format (expected UUID)")
}

async fn run_user_command(service: &CreditService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Add {
            username,
            credit_limit,
        } => {
            let credit_limit_cents = parse_cents(&credit_limit)
                .context("Invalid credit limit format. Use '1000.00' or '1000'")?;

            let user = service.create_user(username, credit_limit_cents).await?;
            println!(
                "Created user: {} (credit limit {})",
                user.username,
                format_cents(user.credit_limit_cents)
            );
        }

        UserCommands::List => {
            let users = service.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<24} {:>12}", "USERNAME", "CREDIT LIMIT");
                println!("{}", "-".repeat(37));
                for user in users {
                    println!(
                        "{:<24} {:>12}",
                        user.username,
                        format_cents(user.credit_limit_cents)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_applications_command(service: &CreditService, username: &str) -> Result<()> {
    let histories = service.get_user_applications(username).await?;

    if histories.is_empty() {
        println!("No applications found for {}.", username);
        return Ok(());
    }

    for history in histories {
        let app = &history.application;
        println!(
            "{} {:<12} requested {:>10}  balance {:>10}  {}",
            app.id,
            app.state,
            format_cents(app.requested_amount_cents),
            format_cents(app.outstanding_balance_cents),
            app.created_at.format("%Y-%m-%d"),
        );
        for transaction in &history.transactions {
            print_transaction_line(transaction);
        }
    }

    Ok(())
}

fn print_transaction_line(transaction: &Transaction) {
    println!(
        "    {:<13} {:>10}  {}",
        transaction.tx_type,
        format_cents(transaction.amount_cents),
        transaction.created_at.format("%Y-%m-%d %H:%M:%S"),
    );
}

fn print_application_info(info: &ApplicationInfo) {
    let app = &info.application;

    println!("Application: {}", app.id);
    println!("  User:             {}", info.user.username);
    println!("  State:            {}", app.state);
    println!(
        "  Requested:        {}",
        format_cents(app.requested_amount_cents)
    );
    println!(
        "  Outstanding:      {}",
        format_cents(app.outstanding_balance_cents)
    );
    println!(
        "  Express delivery: {}",
        if app.express_delivery { "yes" } else { "no" }
    );
    println!(
        "  Created:          {}",
        app.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:          {}",
        app.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    if !info.transactions.is_empty() {
        println!();
        println!(
            "  Disbursed: {}  Repaid: {}",
            format_cents(info.total_disbursed),
            format_cents(info.total_repaid)
        );
        println!("  Transactions:");
        for transaction in &info.transactions {
            print_transaction_line(transaction);
        }
    }
}

async fn run_check_command(service: &CreditService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Users:        {}", report.user_count);
    println!("Applications: {}", report.application_count);
    println!("Transactions: {}", report.transaction_count);
    println!();

    if report.is_ok() {
        println!("No issues found.");
    } else {
        println!("Issues:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &CreditService,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "applications" => {
            let count = exporter.export_applications_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} applications", count);
            }
        }
        "transactions" => {
            let count = exporter.export_transactions_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} users, {} applications, {} transactions",
                    snapshot.users.len(),
                    snapshot.applications.len(),
                    snapshot.transactions.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: applications, transactions, full",
                export_type
            );
        }
    }

    Ok(())
}
