//! A shared `bb8` Redis connection pool, built the same way the teacher
//! crate's `key_value_stores::redis::Redis` builds one, and reused here by
//! both the result/account store and the trip queue.

use anyhow::Context;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use url::Url;

use crate::Result;

pub async fn build_pool(url: &Url) -> Result<Pool<RedisConnectionManager>> {
    let manager = RedisConnectionManager::new(url.clone())
        .context("could not create Redis connection manager")?;
    Pool::builder()
        .build(manager)
        .await
        .context("could not create Redis connection pool")
}
