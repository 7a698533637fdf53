// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use credito::application::CreditService;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(CreditService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = CreditService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Test fixture: standard borrower setup
pub struct SeedUsers;

impl SeedUsers {
    /// Create the demo borrowers: john.doe (limit 1000.00) and
    /// jane.smith (limit 2000.00)
    pub async fn create(service: &CreditService) -> Result<()> {
        service.create_user("john.doe".into(), 100000).await?;
        service.create_user("jane.smith".into(), 200000).await?;
        Ok(())
    }
}
