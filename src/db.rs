use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use tracing::info;

use crate::config::AppConfig;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool using the application configuration.
pub async fn establish_connection(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    let mut opts = ConnectOptions::new(cfg.database_url.clone());
    opts.max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    info!("database connection established");
    Ok(db)
}

/// Creates the payment_orders table and its lookup index when missing.
/// DDL is kept portable across the sqlite and postgres backends.
pub async fn ensure_schema(db: &DbPool) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let statements = [
        r#"CREATE TABLE IF NOT EXISTS payment_orders (
            order_id TEXT PRIMARY KEY,
            amount NUMERIC NOT NULL,
            currency TEXT NOT NULL,
            customer_id TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            customer_email TEXT NOT NULL,
            customer_phone TEXT NOT NULL,
            payment_session_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            original_order_id TEXT,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP
        )"#,
        "CREATE INDEX IF NOT EXISTS idx_payment_orders_customer_phone ON payment_orders (customer_phone)",
    ];

    for sql in statements {
        db.execute(Statement::from_string(backend, sql.to_string()))
            .await?;
    }
    Ok(())
}
