//! The `trips` result store and the `accounts` device-registration store.
//!
//! The original system backs the `trips` table with a managed key-value
//! table (§3, §6); since the teacher crate already depends on `bb8-redis`/
//! `redis` and this workspace has no unrelated-domain AWS SDK to draw on
//! (§4.6's resolved Open Question), both stores are plain Redis `SET`/`GET`
//! against a single JSON value per key — the same "one round trip per key"
//! shape the teacher's `key_value_stores::redis::Redis` uses, simplified
//! since neither store needs pipelining here.

use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use metrics::{describe_histogram, histogram, Unit};
use redis::AsyncCommands;
use tracing::instrument;

use crate::model::{Account, PersistedTripRecord};
use crate::Result;

/// Persists trip outcomes, keyed by trip id.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn put(&self, record: &PersistedTripRecord) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<PersistedTripRecord>>;
}

/// Tracks which devices have authenticated as which account.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, uid: &str) -> Result<Option<Account>>;
    async fn put(&self, account: &Account) -> Result<()>;
}

/// A Redis-backed store shared by both [`ResultStore`] and [`AccountStore`],
/// distinguished only by key prefix (`trips:` / `accounts:`).
pub struct RedisStore {
    pool: Pool<RedisConnectionManager>,
}

impl RedisStore {
    pub fn new(pool: Pool<RedisConnectionManager>) -> Self {
        describe_histogram!(
            "trasa.store.request.duration_seconds",
            Unit::Seconds,
            "Time spent on a single result/account store round trip"
        );
        RedisStore { pool }
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let start = Instant::now();
        let mut conn = self.pool.get().await.context("could not get Redis connection")?;
        let value: Option<String> = conn.get(key).await.context("redis GET failed")?;
        histogram!("trasa.store.request.duration_seconds", (Instant::now() - start).as_secs_f64());
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<()> {
        let start = Instant::now();
        let mut conn = self.pool.get().await.context("could not get Redis connection")?;
        let _: () = conn.set(key, value).await.context("redis SET failed")?;
        histogram!("trasa.store.request.duration_seconds", (Instant::now() - start).as_secs_f64());
        Ok(())
    }
}

#[async_trait]
impl ResultStore for RedisStore {
    #[instrument(name = "ResultStore::put", level = "debug", skip_all, fields(trip.id = %record.id))]
    async fn put(&self, record: &PersistedTripRecord) -> Result<()> {
        let key = format!("trips:{}", record.id);
        let value = serde_json::to_string(record).context("could not serialize trip record")?;
        self.set_raw(&key, value).await
    }

    #[instrument(name = "ResultStore::get", level = "debug", skip_all)]
    async fn get(&self, id: &str) -> Result<Option<PersistedTripRecord>> {
        let key = format!("trips:{id}");
        match self.get_raw(&key).await? {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).context("could not deserialize trip record")?,
            )),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AccountStore for RedisStore {
    #[instrument(name = "AccountStore::get", level = "debug", skip_all)]
    async fn get(&self, uid: &str) -> Result<Option<Account>> {
        let key = format!("accounts:{uid}");
        match self.get_raw(&key).await? {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).context("could not deserialize account record")?,
            )),
            None => Ok(None),
        }
    }

    #[instrument(name = "AccountStore::put", level = "debug", skip_all, fields(account.uid = %account.uid))]
    async fn put(&self, account: &Account) -> Result<()> {
        let key = format!("accounts:{}", account.uid);
        let value = serde_json::to_string(account).context("could not serialize account record")?;
        self.set_raw(&key, value).await
    }
}
