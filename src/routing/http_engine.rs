//! An HTTP-backed [`RoutingEngine`], speaking the same `/trip` and `/table`
//! JSON contract OSRM-style routing backends expose: `POST` is not used —
//! these are read-only `GET` calls with semicolon-joined coordinates, a
//! `geometries=polyline` request, and a top-level `code` field that must be
//! `"Ok"` (case-insensitively) for the response to be trusted.

use std::time::Instant;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::stream::StreamExt;
use hyper::{Body, Request};
use metrics::{describe_histogram, histogram, Unit};
use serde::Deserialize;
use tracing::instrument;

use crate::http_client::SharedHttpClient;
use crate::model::{TravelCost, UnoptimizedTrip};
use crate::spacial::Coordinates;

use super::{EngineLeg, EngineTripResult, EngineWaypoint, RoutingEngine, RoutingError};

/// One region's routing engine, reached over HTTP at `base_url`.
pub struct HttpRoutingEngine {
    base_url: String,
    client: SharedHttpClient,
}

impl HttpRoutingEngine {
    pub fn new(base_url: impl Into<String>, client: SharedHttpClient) -> Self {
        describe_histogram!(
            "trasa.routing.request.duration_seconds",
            Unit::Seconds,
            "Time spent waiting for the routing engine to answer a request"
        );
        HttpRoutingEngine {
            base_url: base_url.into(),
            client,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path_and_query: &str) -> anyhow::Result<T> {
        let start = Instant::now();
        let uri = format!("{}{}", self.base_url, path_and_query);
        let req = Request::builder()
            .method("GET")
            .uri(&uri)
            .body(Body::empty())
            .context("could not build routing engine request")?;
        let res = self
            .client
            .request(req)
            .await
            .context("routing engine request failed")?;
        let status = res.status();
        let mut body = res.into_body();
        let mut body_data = Vec::new();
        while let Some(chunk) = body.next().await {
            body_data.extend(&chunk?[..]);
        }

        histogram!(
            "trasa.routing.request.duration_seconds",
            (Instant::now() - start).as_secs_f64(),
        );

        if !status.is_success() {
            bail!(
                "routing engine returned HTTP {}: {}",
                status,
                String::from_utf8_lossy(&body_data)
            );
        }
        serde_json::from_slice(&body_data).context("could not parse routing engine response")
    }
}

#[derive(Debug, Deserialize)]
struct TripResponse {
    code: String,
    #[serde(default)]
    waypoints: Vec<TripWaypoint>,
    #[serde(default)]
    trips: Vec<TripRoute>,
}

#[derive(Debug, Deserialize)]
struct TripWaypoint {
    waypoint_index: usize,
    #[serde(default)]
    trips_index: usize,
}

#[derive(Debug, Deserialize)]
struct TripRoute {
    #[serde(default)]
    legs: Vec<TripLeg>,
    geometry: String,
}

#[derive(Debug, Deserialize)]
struct TripLeg {
    distance: f64,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    code: String,
    distances: Vec<Vec<Option<f64>>>,
    durations: Vec<Vec<Option<f64>>>,
}

fn coordinate_list(points: impl Iterator<Item = Coordinates>) -> String {
    points
        .map(|c| format!("{},{}", c.longitude, c.latitude))
        .collect::<Vec<_>>()
        .join(";")
}

fn check_status(code: &str) -> anyhow::Result<()> {
    if code.eq_ignore_ascii_case("ok") {
        Ok(())
    } else {
        Err(RoutingError::EngineStatus(code.to_owned()).into())
    }
}

#[async_trait]
impl RoutingEngine for HttpRoutingEngine {
    #[instrument(name = "HttpRoutingEngine::optimize_trip", level = "debug", skip_all)]
    async fn optimize_trip(&self, trip: &UnoptimizedTrip) -> anyhow::Result<EngineTripResult> {
        let coords = coordinate_list(trip.waypoints().iter().map(|w| w.building.coords));
        let destination = if trip.is_roundtrip() { "any" } else { "last" };
        let query = format!(
            "/trip/v1/driving/{coords}?source=first&destination={destination}&overview=full&geometries=polyline"
        );

        let response: TripResponse = self.get_json(&query).await?;
        check_status(&response.code)?;

        let route = response
            .trips
            .into_iter()
            .next()
            .context("routing engine returned no trips")?;

        Ok(EngineTripResult {
            waypoints: response
                .waypoints
                .into_iter()
                .map(|w| EngineWaypoint {
                    waypoint_index: w.waypoint_index,
                    trips_index: w.trips_index,
                })
                .collect(),
            legs: route
                .legs
                .into_iter()
                .map(|leg| EngineLeg {
                    distance_meters: leg.distance,
                    duration_seconds: leg.duration,
                })
                .collect(),
            geometry: route.geometry,
        })
    }

    #[instrument(name = "HttpRoutingEngine::distance", level = "debug", skip_all)]
    async fn distance(&self, from: Coordinates, to: Coordinates) -> anyhow::Result<TravelCost> {
        let coords = coordinate_list([from, to].into_iter());
        let query = format!("/table/v1/driving/{coords}?annotations=distance,duration");

        let response: TableResponse = self.get_json(&query).await?;
        check_status(&response.code)?;

        let distance = response
            .distances
            .get(0)
            .and_then(|row| row.get(1))
            .and_then(|v| *v)
            .context("routing engine table response missing distance")?;
        let duration = response
            .durations
            .get(0)
            .and_then(|row| row.get(1))
            .and_then(|v| *v)
            .context("routing engine table response missing duration")?;

        Ok(TravelCost {
            distance_meters: distance.round() as i64,
            duration_seconds: duration.round() as i64,
        })
    }
}
