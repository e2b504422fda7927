use crate::errors::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Pool, Postgres, Transaction};
use std::time::Duration;

pub type PgTransaction<'a> = Transaction<'a, Postgres>;

pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Database { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction owned by the caller. Ledger mutations must run
    /// inside one of these so they commit or roll back with the surrounding
    /// order work.
    pub async fn begin(&self) -> Result<PgTransaction<'static>> {
        Ok(self.pool.begin().await?)
    }
}
