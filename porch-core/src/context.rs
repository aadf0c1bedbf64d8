use std::sync::Arc;

use crate::config::Config;
use crate::db::{create_pool, DbConnection, DbPool};
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub db_pool: Arc<DbPool>,
}

impl AppContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db_pool = create_pool(&config.database).await?;

        Ok(AppContext {
            config: Arc::new(config),
            db_pool,
        })
    }

    /// Checked-out pooled connection; pool exhaustion/outage surfaces as an
    /// opaque storage error.
    pub async fn conn(&self) -> Result<DbConnection> {
        self.db_pool
            .get()
            .await
            .map_err(|e| Error::Store(e.to_string()))
    }
}
