//! A shared `hyper` HTTP client, pooled and reused across the routing
//! engine pool, the JWKS refresh task, and the object-store fetcher.
//!
//! Grounded in the teacher crate's `geocoders::shared_http_client`.

use std::sync::Arc;

use hyper::client::HttpConnector;
use hyper::Client;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};

/// A `hyper` client shared between multiple callers, with a connection pool
/// for keep-alive reuse.
pub type SharedHttpClient = Arc<Client<HttpsConnector<HttpConnector>>>;

pub fn shared_http_client(pool_max_idle_per_host: usize) -> SharedHttpClient {
    Arc::new(
        Client::builder()
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .build(
                HttpsConnectorBuilder::new()
                    .with_native_roots()
                    .https_or_http()
                    .enable_http1()
                    .enable_http2()
                    .build(),
            ),
    )
}
