//! Entry point (§6): `trasa-core <config-file> [rpc|worker|both|none]`.
//!
//! Loads the JSON config, builds the read-only domain components shared by
//! every connection and worker (region locator, geocoder, routing pool,
//! auth guard), then runs whichever subsystems `role` names. `none` loads
//! the config and validates region/routing data, then exits — used in CI.

pub use anyhow::{Context, Result};

mod auth;
mod config;
mod errors;
mod geocoder;
mod http_client;
mod model;
mod object_store;
mod redis_pool;
mod routing;
mod scheduler;
mod server;
mod services;
mod spacial;
mod store;
mod tracking;
mod worker;

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use metrics::describe_counter;
use opinionated_metrics::Mode;
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::{
    fmt::{format::FmtSpan, Subscriber},
    prelude::*,
    EnvFilter,
};

use crate::auth::AuthGuard;
use crate::config::{AddressBookConfig, Config, GeocoderMode, Opt, RegionConfig, Role};
use crate::errors::display_causes_and_backtrace;
use crate::geocoder::backends::fts::FtsBackend;
use crate::geocoder::backends::radix::RadixBackend;
use crate::geocoder::backends::AddressBookBackend;
use crate::geocoder::decomposer::NullLabelModel;
use crate::geocoder::Geocoder;
use crate::http_client::{shared_http_client, SharedHttpClient};
use crate::object_store::fetch_cached;
use crate::redis_pool::build_pool;
use crate::routing::{HttpRoutingEngine, RoutingEngine, RoutingPool};
use crate::scheduler::{RedisTripQueue, TripQueue};
use crate::server::run_server;
use crate::services::Services;
use crate::spacial::{polyfile, Region, RegionLocator};
use crate::store::{AccountStore, RedisStore, ResultStore};
use crate::worker::{spawn_workers, worker_count, WorkerContext};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env();
    Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_env_filter(filter)
        .finish()
        .init();
    let _span = info_span!("trasa-core").entered();
    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let opt = Opt::parse();

    let metrics_builder = opinionated_metrics::Builder::new(Mode::Cli);
    let metrics_handle = metrics_builder.install()?;
    describe_counter!(
        "trasa.startup.count",
        "Incremented once per process start, by role"
    );
    metrics::counter!("trasa.startup.count", 1, "role" => format!("{:?}", opt.role));

    let result = run(opt).await;
    if let Err(err) = &result {
        display_causes_and_backtrace(err);
    }

    if let Err(err) = metrics_handle.report().await {
        warn!("could not report metrics: {:?}", err);
    }

    result
}

async fn run(opt: Opt) -> Result<()> {
    let config = load_config(&opt.config_file)?;
    let client = shared_http_client(16);

    let locator = build_region_locator(&config.regions, &client).await?;
    let geocoder = Arc::new(build_geocoder(&config, locator, &client).await?);
    let routing_pool = Arc::new(build_routing_pool(&config));

    if opt.role == Role::None {
        info!("config loaded and region/routing data validated; exiting (role=none)");
        return Ok(());
    }

    let redis_url = config
        .aws
        .redis_url
        .parse()
        .context("could not parse aws.redis_url")?;
    let pool = build_pool(&redis_url).await?;

    let redis_store = Arc::new(RedisStore::new(pool.clone()));
    let result_store: Arc<dyn ResultStore> = redis_store.clone();
    let account_store: Arc<dyn AccountStore> = redis_store;
    let queue: Arc<dyn TripQueue> = Arc::new(RedisTripQueue::new(pool));

    let auth = Arc::new(AuthGuard::new(
        config.rpc.auth.iter().map(Into::into).collect(),
        client.clone(),
    ));
    auth.refresh()
        .await
        .context("could not build the initial auth key set")?;
    let _refresh_handle = auth.spawn_refresh_loop(Duration::from_secs(3600));

    let services = Services::new(
        Arc::clone(&geocoder),
        Arc::clone(&routing_pool),
        Arc::clone(&queue),
        Arc::clone(&result_store),
        Arc::clone(&account_store),
        config.routing.clone(),
    );

    let listen_addr = format!("{}:{}", config.rpc.address, config.rpc.port);

    match opt.role {
        Role::None => unreachable!("handled above"),
        Role::Rpc => run_server(&listen_addr, services, auth).await,
        Role::Worker => {
            let ctx = Arc::new(WorkerContext {
                queue,
                routing_pool,
                result_store,
            });
            let handles = spawn_workers(ctx, worker_count(config.routing.worker_concurrency));
            futures::future::try_join_all(handles)
                .await
                .context("a worker task panicked")?;
            Ok(())
        }
        Role::Both => {
            let ctx = Arc::new(WorkerContext {
                queue,
                routing_pool,
                result_store,
            });
            let worker_handles = spawn_workers(ctx, worker_count(config.routing.worker_concurrency));
            tokio::select! {
                res = run_server(&listen_addr, services, auth) => res,
                res = futures::future::try_join_all(worker_handles) => {
                    res.context("a worker task panicked")?;
                    Ok(())
                }
            }
        }
    }
}

fn load_config(path: &std::path::Path) -> Result<Config> {
    let file = File::open(path).with_context(|| format!("could not open config file {path:?}"))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("could not parse config file {path:?}"))
}

/// Fetch (caching as needed) and parse every enabled region's poly-file,
/// then build the locator. Fails fast on a missing/duplicate/unparseable
/// region, per §9's fail-fast guidance for data-download failures.
async fn build_region_locator(regions: &[RegionConfig], client: &SharedHttpClient) -> Result<RegionLocator> {
    let mut built = Vec::new();
    for region in regions {
        if !region.enabled {
            continue;
        }
        let path = fetch_cached(&region.poly, client)
            .await
            .with_context(|| format!("could not fetch poly file for region {}", region.name))?;
        let file = File::open(&path)
            .with_context(|| format!("could not open poly file for region {}", region.name))?;
        let polygon = polyfile::parse_region_polygon(BufReader::new(file), &region.name)
            .with_context(|| format!("could not parse poly file for region {}", region.name))?;
        built.push(Region::new(region.name.clone(), polygon));
    }
    RegionLocator::build(built)
}

/// Build the address book backend named by `geocoder.mode`, loading every
/// enabled region's data (a SQLite FTS5 database, or an address-book CSV
/// bulk-loaded into the in-memory radix backend).
async fn build_geocoder(config: &Config, locator: RegionLocator, client: &SharedHttpClient) -> Result<Geocoder> {
    let backend = match config.geocoder.mode {
        GeocoderMode::SqliteFts => {
            let mut paths = HashMap::new();
            for region in &config.regions {
                if !region.enabled {
                    continue;
                }
                match &region.addressbook {
                    AddressBookConfig::SqliteFts { sqlite_fts } => {
                        let path = fetch_cached(sqlite_fts, client).await.with_context(|| {
                            format!("could not fetch address book for region {}", region.name)
                        })?;
                        paths.insert(region.name.clone(), path);
                    }
                    AddressBookConfig::Radix { .. } => {
                        anyhow::bail!(
                            "region {} is configured for geocoder.mode sqlite_fts but names a radix addressbook path",
                            region.name
                        );
                    }
                }
            }
            AddressBookBackend::Fts(FtsBackend::open(paths)?)
        }
        GeocoderMode::Radix => {
            let mut radix = RadixBackend::new();
            for region in &config.regions {
                if !region.enabled {
                    continue;
                }
                match &region.addressbook {
                    AddressBookConfig::Radix { radix: csv_source } => {
                        let path = fetch_cached(csv_source, client).await.with_context(|| {
                            format!("could not fetch address book for region {}", region.name)
                        })?;
                        let file = File::open(&path).with_context(|| {
                            format!("could not open address book CSV for region {}", region.name)
                        })?;
                        radix
                            .load_csv(&region.name, BufReader::new(file))
                            .with_context(|| format!("could not load address book for region {}", region.name))?;
                    }
                    AddressBookConfig::SqliteFts { .. } => {
                        anyhow::bail!(
                            "region {} is configured for geocoder.mode radix but names a sqlite_fts addressbook path",
                            region.name
                        );
                    }
                }
            }
            radix.seal();
            AddressBookBackend::Radix(radix)
        }
    };

    Ok(Geocoder::new(locator, Box::new(NullLabelModel), backend))
}

/// One [`HttpRoutingEngine`] per enabled region, all speaking to the same
/// configured routing backend base URL (this crate has no embedded, one-
/// archive-per-region engine of its own — see `DESIGN.md`).
fn build_routing_pool(config: &Config) -> RoutingPool {
    let client = shared_http_client(16);
    let mut engines: HashMap<String, Arc<dyn RoutingEngine>> = HashMap::new();
    for region in &config.regions {
        if !region.enabled {
            continue;
        }
        engines.insert(
            region.name.clone(),
            Arc::new(HttpRoutingEngine::new(
                config.routing.engine_base_url.clone(),
                client.clone(),
            )) as Arc<dyn RoutingEngine>,
        );
    }
    RoutingPool::new(engines)
}
