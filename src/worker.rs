//! The worker pool: `hardware_concurrency * worker_concurrency` blocking
//! tasks per node, each consuming the trip queue and persisting results.
//!
//! Grounded in the distilled spec's worker pseudocode (§4.7): a worker never
//! re-queues. Every exception path ends in a `failed` record plus
//! `discard_trip`. Implemented as `spawn_blocking` tasks because
//! `RoutingEngine::optimize_trip` occupies the calling task until done
//! rather than suspending (§5) — the case `spawn_blocking` exists for, even
//! though the call itself happens to be `async` here (it awaits network
//! I/O against the routing engine, not CPU-bound local work); the blocking
//! task boundary keeps this component's behavior symmetric with a future
//! in-process (CPU-bound) engine implementation.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::model::PersistedTripRecord;
use crate::routing::RoutingPool;
use crate::scheduler::{poll_backoff, TripQueue};
use crate::store::ResultStore;
use crate::tracking;

/// Everything one worker task needs to process trips.
pub struct WorkerContext {
    pub queue: Arc<dyn TripQueue>,
    pub routing_pool: Arc<RoutingPool>,
    pub result_store: Arc<dyn ResultStore>,
}

/// Spawn `worker_count` worker tasks, each running the infinite poll loop.
/// Returns their join handles so the caller (`both`/`worker` role) can await
/// them alongside the front end.
pub fn spawn_workers(ctx: Arc<WorkerContext>, worker_count: usize) -> Vec<tokio::task::JoinHandle<()>> {
    (0..worker_count)
        .map(|index| {
            let ctx = Arc::clone(&ctx);
            tokio::task::spawn_blocking(move || {
                let runtime = tokio::runtime::Handle::current();
                runtime.block_on(worker_loop(ctx, index));
            })
        })
        .collect()
}

#[instrument(name = "worker_loop", skip_all, fields(worker.index = index))]
async fn worker_loop(ctx: Arc<WorkerContext>, index: usize) {
    loop {
        match ctx.queue.poll_trip_request().await {
            Ok(Some(request)) => process_one(&ctx, request).await,
            // A plain thread park, not an async sleep: this loop already
            // runs on a dedicated blocking-pool thread (§4.7/§5), so parking
            // it directly matches the original's blocking-thread backoff
            // instead of routing through the reactor.
            Ok(None) => std::thread::sleep(poll_backoff()),
            Err(err) => {
                warn!("worker {} failed to poll the trip queue: {:?}", index, err);
                std::thread::sleep(poll_backoff());
            }
        }
    }
}

async fn process_one(ctx: &WorkerContext, request: crate::scheduler::TripRequest) {
    let meta = request.meta;
    let id = meta.id.clone().unwrap_or_default();

    match ctx.routing_pool.optimize_trip(&request.trip, &meta.region).await {
        Ok(optimized) => {
            let total_cost = optimized.total_cost();
            let response_json = json!({
                "waypoints": optimized.waypoints,
                "legs": optimized.legs,
                "geometry": optimized.geometry,
                "total_cost": total_cost,
            });
            let record = PersistedTripRecord::ready(
                id.clone(),
                meta.account_id.clone(),
                meta.region.clone(),
                response_json,
                optimized.geometry.clone(),
                total_cost,
            );

            if let Err(err) = ctx.result_store.put(&record).await {
                error!("could not persist ready trip record {}: {:?}", id, err);
                return;
            }
            tracking::emit(&meta.account_id, &meta.region, "trip.completed");
            if let Err(err) = ctx.queue.complete_trip(&meta).await {
                error!("could not acknowledge completed trip {}: {:?}", id, err);
            }
        }
        Err(err) => {
            let record = PersistedTripRecord::failed(
                id.clone(),
                meta.account_id.clone(),
                meta.region.clone(),
                err.to_string(),
            );
            if let Err(store_err) = ctx.result_store.put(&record).await {
                error!("could not persist failed trip record {}: {:?}", id, store_err);
                return;
            }
            info!("trip {} failed: {:?}", id, err);
            if let Err(ack_err) = ctx.queue.discard_trip(&meta).await {
                error!("could not discard failed trip {}: {:?}", id, ack_err);
            }
        }
    }
}

/// `hardware_concurrency * worker_concurrency`, per §4.7/§5.
pub fn worker_count(worker_concurrency: usize) -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * worker_concurrency
}
