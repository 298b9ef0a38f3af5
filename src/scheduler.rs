//! The asynchronous trip scheduler: a durable, at-least-once work queue a
//! worker pool consumes to offload long trips from the synchronous `trip`
//! RPC path.
//!
//! Backed by Redis rather than the original system's managed message queue
//! (§4.6's resolved Open Question — keeps the dependency stack aligned with
//! the teacher crate instead of pulling in an unrelated SDK), using the
//! classic `BRPOPLPUSH`-into-an-in-flight-list reliable-queue pattern: a
//! receipt hash maps an opaque receipt handle to the checked-out message so
//! `complete_trip`/`discard_trip` can find and remove it. This crate does
//! not implement a stale-in-flight recovery sweep (the moral equivalent of
//! a visibility-timeout expiry); a message a worker never acknowledges
//! stays in the in-flight list until an operator intervenes, a tradeoff
//! recorded in `DESIGN.md`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::model::{TripMetadata, TripPromise, UnoptimizedTrip};
use crate::Result;

const QUEUE_KEY: &str = "pending_routes";
const INFLIGHT_KEY: &str = "pending_routes:inflight";
const RECEIPTS_KEY: &str = "pending_routes:receipts";

/// A trip request read back off the queue, with its metadata's `id` and
/// `receipt_handle` populated.
#[derive(Clone, Debug)]
pub struct TripRequest {
    pub trip: UnoptimizedTrip,
    pub meta: TripMetadata,
}

/// The wire shape enqueued as a single JSON value.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct QueueMessage {
    trip: UnoptimizedTrip,
    meta: TripMetadata,
}

/// The durable, at-least-once queue contract. Workers must be idempotent:
/// the same `id` may be processed more than once (§4.6).
#[async_trait]
pub trait TripQueue: Send + Sync {
    /// Approximate pending-message count, used to compute `expected_at`.
    async fn pending_count(&self) -> Result<u64>;

    /// Serialize `trip`/`meta` as JSON, enqueue, and return a promise.
    async fn schedule_trip(&self, trip: UnoptimizedTrip, region: &str, account_id: &str) -> Result<TripPromise>;

    /// Pull up to one message. A message that fails to parse is poison: it
    /// is acknowledged immediately and `None` is returned without surfacing
    /// an error.
    async fn poll_trip_request(&self) -> Result<Option<TripRequest>>;

    /// Acknowledge the message using `meta.receipt_handle`, called only
    /// after the result store has accepted a `ready` record.
    async fn complete_trip(&self, meta: &TripMetadata) -> Result<()>;

    /// Acknowledge the message without recording a result, called only
    /// after a `failed` record has been persisted.
    async fn discard_trip(&self, meta: &TripMetadata) -> Result<()>;
}

pub struct RedisTripQueue {
    pool: Pool<RedisConnectionManager>,
}

impl RedisTripQueue {
    pub fn new(pool: Pool<RedisConnectionManager>) -> Self {
        RedisTripQueue { pool }
    }

    /// Remove `message` from the in-flight list and drop its receipt, if
    /// any. Used by both `complete_trip` and `discard_trip` — the two
    /// differ only in whether the caller already wrote a `ready`/`failed`
    /// record first.
    async fn ack(&self, receipt_handle: &str) -> Result<()> {
        let mut conn = self.pool.get().await.context("could not get Redis connection")?;
        let message: Option<String> = conn
            .hget(RECEIPTS_KEY, receipt_handle)
            .await
            .context("could not look up receipt")?;
        if let Some(message) = message {
            let _: i64 = conn
                .lrem(INFLIGHT_KEY, 1, &message)
                .await
                .context("could not remove in-flight message")?;
        }
        let _: i64 = conn
            .hdel(RECEIPTS_KEY, receipt_handle)
            .await
            .context("could not delete receipt")?;
        Ok(())
    }
}

fn random_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[async_trait]
impl TripQueue for RedisTripQueue {
    #[instrument(name = "TripQueue::pending_count", level = "debug", skip_all)]
    async fn pending_count(&self) -> Result<u64> {
        let mut conn = self.pool.get().await.context("could not get Redis connection")?;
        let len: u64 = conn.llen(QUEUE_KEY).await.context("redis LLEN failed")?;
        Ok(len)
    }

    #[instrument(name = "TripQueue::schedule_trip", level = "debug", skip_all, fields(region = %region))]
    async fn schedule_trip(&self, trip: UnoptimizedTrip, region: &str, account_id: &str) -> Result<TripPromise> {
        let id = random_id(20);
        let meta = TripMetadata {
            id: Some(id.clone()),
            receipt_handle: None,
            region: region.to_owned(),
            account_id: account_id.to_owned(),
            created_at: Utc::now(),
        };
        let message = QueueMessage { trip, meta };
        let body = serde_json::to_string(&message).context("could not serialize trip request")?;

        let mut conn = self.pool.get().await.context("could not get Redis connection")?;
        let _: i64 = conn.lpush(QUEUE_KEY, body).await.context("could not enqueue trip request")?;

        let scheduled_at = Utc::now();
        let expected_at = scheduled_at + chrono::Duration::seconds(3);
        Ok(TripPromise {
            id,
            scheduled_at,
            expected_at,
        })
    }

    #[instrument(name = "TripQueue::poll_trip_request", level = "debug", skip_all)]
    async fn poll_trip_request(&self) -> Result<Option<TripRequest>> {
        let mut conn = self.pool.get().await.context("could not get Redis connection")?;
        let body: Option<String> = conn
            .brpoplpush(QUEUE_KEY, INFLIGHT_KEY, 1.0)
            .await
            .context("redis BRPOPLPUSH failed")?;
        let Some(body) = body else {
            return Ok(None);
        };

        let message: std::result::Result<QueueMessage, _> = serde_json::from_str(&body);
        let Ok(mut message) = message else {
            // Poison message: acknowledge (delete) immediately, never retry.
            let _: i64 = conn.lrem(INFLIGHT_KEY, 1, &body).await.context("could not discard poison message")?;
            return Ok(None);
        };

        let receipt_handle = random_id(24);
        let _: () = conn
            .hset(RECEIPTS_KEY, &receipt_handle, &body)
            .await
            .context("could not record receipt")?;
        message.meta.receipt_handle = Some(receipt_handle);

        Ok(Some(TripRequest {
            trip: message.trip,
            meta: message.meta,
        }))
    }

    #[instrument(name = "TripQueue::complete_trip", level = "debug", skip_all)]
    async fn complete_trip(&self, meta: &TripMetadata) -> Result<()> {
        let handle = meta
            .receipt_handle
            .as_deref()
            .context("complete_trip requires a receipt handle")?;
        self.ack(handle).await
    }

    #[instrument(name = "TripQueue::discard_trip", level = "debug", skip_all)]
    async fn discard_trip(&self, meta: &TripMetadata) -> Result<()> {
        let handle = meta
            .receipt_handle
            .as_deref()
            .context("discard_trip requires a receipt handle")?;
        self.ack(handle).await
    }
}

// Sleep helper shared by the worker pool's empty-poll backoff (§4.7).
pub fn poll_backoff() -> Duration {
    Duration::from_secs(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_id_has_requested_length() {
        assert_eq!(random_id(20).len(), 20);
    }
}
