//! Seed the database with demo data.
//!
//! Inserts a demo user (with a known bearer token), a small catalog of
//! products with variations and stock, and a default address. Re-running
//! updates the demo user's token and leaves existing rows alone.

use orchard_core::{CurrencyCode, Money};
use sqlx::{PgPool, Row};
use tracing::info;

const DEMO_EMAIL: &str = "demo@orchard.test";

/// Seed demo data.
///
/// # Errors
///
/// Returns an error if the database is unreachable or an insert fails.
pub async fn run(token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;

    let user_id = seed_user(&pool, token).await?;
    info!(user_id, email = DEMO_EMAIL, "Seeded demo user");

    let tee = seed_product(&pool, "Orchard Tee", 1500).await?;
    seed_variation(&pool, tee, "Small", None, 10).await?;
    seed_variation(&pool, tee, "Medium", None, 25).await?;
    seed_variation(&pool, tee, "Large", Some(1700), 5).await?;

    let mug = seed_product(&pool, "Orchard Mug", 900).await?;
    seed_variation(&pool, mug, "Standard", None, 40).await?;

    seed_address(&pool, user_id).await?;

    info!("Seeding complete! Authenticate with: Authorization: Bearer {token}");
    Ok(())
}

async fn seed_user(pool: &PgPool, token: &str) -> Result<i32, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO users (email, api_token)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE SET api_token = EXCLUDED.api_token
        RETURNING id
        "#,
    )
    .bind(DEMO_EMAIL)
    .bind(token)
    .fetch_one(pool)
    .await?;
    row.try_get("id")
}

async fn seed_product(pool: &PgPool, name: &str, price: i64) -> Result<i32, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO products (name, price, currency)
        VALUES ($1, $2, 'GBP')
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(price)
    .fetch_one(pool)
    .await?;
    let id: i32 = row.try_get("id")?;
    info!(
        id,
        name,
        price = %Money::new(price, CurrencyCode::GBP),
        "Seeded product"
    );
    Ok(id)
}

async fn seed_variation(
    pool: &PgPool,
    product_id: i32,
    name: &str,
    price: Option<i64>,
    quantity: i64,
) -> Result<(), sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO product_variations (product_id, name, price)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(product_id)
    .bind(name)
    .bind(price)
    .fetch_one(pool)
    .await?;
    let variation_id: i32 = row.try_get("id")?;

    sqlx::query(
        r#"
        INSERT INTO stocks (product_variation_id, quantity)
        VALUES ($1, $2)
        "#,
    )
    .bind(variation_id)
    .bind(quantity)
    .execute(pool)
    .await?;
    Ok(())
}

async fn seed_address(pool: &PgPool, user_id: i32) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO addresses (user_id, name, address_line, city, postal_code, country, "default")
        VALUES ($1, 'Home', '1 Orchard Lane', 'London', 'E1 6AN', 'GB', TRUE)
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}
