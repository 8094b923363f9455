//! Database migration command.
//!
//! Applies the shop's migrations from `crates/shop/migrations/` using the
//! sqlx migrator. Safe to run repeatedly; applied migrations are skipped.

use tracing::info;

/// Run shop database migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;

    info!("Running shop migrations...");
    sqlx::migrate!("../shop/migrations").run(&pool).await?;

    info!("Shop migrations complete!");
    Ok(())
}
