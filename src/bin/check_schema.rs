//! Utility to inspect the database schema and print the CRM table structures.

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;

const CRM_TABLES: [&str; 4] = [
    "prospects",
    "custom_tables",
    "custom_table_records",
    "informations_enrichies",
];

/// Main entry point for the schema inspection utility.
///
/// Connects to the database and lists the columns of every CRM table,
/// flagging the ones that are missing.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let database_url = env::var("DATABASE_URL")
        .or_else(|_| env::var("DB_URL"))
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;

    let mut missing = 0;
    for table in CRM_TABLES {
        let columns: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns
             WHERE table_schema = 'public' AND table_name = $1
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&pool)
        .await?;

        if columns.is_empty() {
            println!("✗ {} (missing)", table);
            missing += 1;
            continue;
        }

        println!("✓ {}", table);
        for (col, type_, nullable) in columns {
            let null = if nullable == "YES" { "" } else { " not null" };
            println!("  - {}: {}{}", col, type_, null);
        }
        println!();
    }

    if missing > 0 {
        anyhow::bail!("{} table(s) missing, run with RUN_MIGRATIONS=true", missing);
    }

    Ok(())
}
