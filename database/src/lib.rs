mod cache;
mod credentials;

pub use cache::*;
pub use credentials::*;

use feedfilter_core::{
    ChangeNotifier, CoreError, KeyValueStore, StorageChange, StorageError, StorageSubscription,
};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, warn};

const CREATE_KV_TABLE: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)";

/// SQLite-backed key-value store holding JSON values.
#[derive(Debug)]
pub struct SqliteStore {
    connection_string: String,
    pool: Option<SqlitePool>,
    notifier: ChangeNotifier,
}

impl SqliteStore {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
            notifier: ChangeNotifier::new(),
        }
    }

    /// Connects and runs migrations in one step.
    pub async fn open(connection_string: String) -> Result<Self, CoreError> {
        let mut store = Self::new(connection_string);
        store.connect().await?;
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| StorageError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true);

        // A single connection keeps `sqlite::memory:` databases coherent.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to store at {}", self.connection_string);
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::query(CREATE_KV_TABLE)
            .execute(self.pool()?)
            .await
            .map_err(|e| StorageError::MigrationFailed {
                migration: format!("create kv_store: {}", e),
            })?;
        debug!("Store migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }

    fn pool(&self) -> Result<&SqlitePool, CoreError> {
        self.pool.as_ref().ok_or_else(|| {
            StorageError::NotConnected {
                store: self.connection_string.clone(),
            }
            .into()
        })
    }
}

fn decode_value(key: &str, raw: &str) -> Result<Value, CoreError> {
    serde_json::from_str(raw).map_err(|e| {
        StorageError::CorruptValue {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

impl KeyValueStore for SqliteStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>, CoreError> {
        let pool = self.pool()?;
        let mut values = HashMap::with_capacity(keys.len());
        for key in keys {
            let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
                .bind(*key)
                .fetch_optional(pool)
                .await?;
            if let Some(row) = row {
                let raw: String = row.try_get("value")?;
                values.insert(key.to_string(), decode_value(key, &raw)?);
            }
        }
        Ok(values)
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<(), CoreError> {
        let pool = self.pool()?;
        let mut changes = Vec::with_capacity(items.len());
        let mut tx = pool.begin().await?;

        for (key, value) in items {
            let old_raw: Option<String> =
                sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?")
                    .bind(key.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;

            sqlx::query(
                "INSERT INTO kv_store (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key.as_str())
            .bind(value.to_string())
            .execute(&mut *tx)
            .await?;

            changes.push(StorageChange {
                old_value: old_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
                key,
                new_value: Some(value),
            });
        }

        tx.commit().await?;
        for change in changes {
            self.notifier.notify(change);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<(), CoreError> {
        let pool = self.pool()?;
        let mut changes = Vec::new();
        let mut tx = pool.begin().await?;

        for key in keys {
            let old_raw: Option<String> =
                sqlx::query_scalar("DELETE FROM kv_store WHERE key = ? RETURNING value")
                    .bind(key.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;

            if let Some(raw) = old_raw {
                changes.push(StorageChange {
                    key: key.clone(),
                    old_value: serde_json::from_str(&raw).ok(),
                    new_value: None,
                });
            }
        }

        tx.commit().await?;
        for change in changes {
            self.notifier.notify(change);
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>, CoreError> {
        let rows = sqlx::query("SELECT key, value FROM kv_store")
            .fetch_all(self.pool()?)
            .await?;

        let mut values = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("key")?;
            let raw: String = row.try_get("value")?;
            let value = match decode_value(&key, &raw) {
                Ok(value) => value,
                Err(e) => {
                    // Keep the key enumerable so bulk removal still reaches it.
                    warn!("{}", e);
                    Value::Null
                }
            };
            values.insert(key, value);
        }
        Ok(values)
    }

    fn subscribe(&self) -> StorageSubscription {
        self.notifier.subscribe()
    }
}
