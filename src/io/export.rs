use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::CreditService;
use crate::domain::{format_cents, CreditApplication, Transaction, User};

/// Database snapshot for full export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub users: Vec<User>,
    pub applications: Vec<CreditApplication>,
    pub transactions: Vec<Transaction>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a CreditService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a CreditService) -> Self {
        Self { service }
    }

    /// Export all transactions to CSV format
    pub async fn export_transactions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let transactions = self.service.list_all_transactions().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "application_id",
            "type",
            "amount",
            "created_at",
        ])?;

        let mut count = 0;
        for transaction in &transactions {
            csv_writer.write_record([
                transaction.id.to_string(),
                transaction.sequence.to_string(),
                transaction.application_id.to_string(),
                transaction.tx_type.to_string(),
                format_cents(transaction.amount_cents),
                transaction.created_at.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export all applications to CSV format
    pub async fn export_applications_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let applications = self.service.list_all_applications().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "user_id",
            "state",
            "requested_amount",
            "outstanding_balance",
            "express_delivery",
            "created_at",
            "updated_at",
        ])?;

        let mut count = 0;
        for application in &applications {
            csv_writer.write_record([
                application.id.to_string(),
                application.user_id.to_string(),
                application.state.to_string(),
                format_cents(application.requested_amount_cents),
                format_cents(application.outstanding_balance_cents),
                application.express_delivery.to_string(),
                application.created_at.to_rfc3339(),
                application.updated_at.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export the full database as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<DatabaseSnapshot> {
        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            users: self.service.list_users().await?,
            applications: self.service.list_all_applications().await?,
            transactions: self.service.list_all_transactions().await?,
        };

        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writeln!(writer)?;
        Ok(snapshot)
    }
}
