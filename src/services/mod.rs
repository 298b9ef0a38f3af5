//! Trip and geocode service handlers (§4.10): the bound service map the
//! front end dispatches JSON-RPC `method`s against.

use std::sync::Arc;

use metrics::{counter, describe_counter};
use serde_json::{json, Value};
use tracing::instrument;

use crate::auth::RequestContext;
use crate::config::RoutingConfig;
use crate::errors::ServiceError;
use crate::geocoder::Geocoder;
use crate::model::{new_sync_trip_id, AddressComponents, TripMetadata, UnoptimizedTrip, Waypoint};
use crate::routing::RoutingPool;
use crate::scheduler::TripQueue;
use crate::spacial::Coordinates;
use crate::store::{AccountStore, ResultStore};
use crate::tracking;

/// Everything a request handler needs: the read-only domain components plus
/// the stateful stores/queue, shared across every connection.
pub struct Services {
    pub geocoder: Arc<Geocoder>,
    pub routing_pool: Arc<RoutingPool>,
    pub queue: Arc<dyn TripQueue>,
    pub result_store: Arc<dyn ResultStore>,
    pub account_store: Arc<dyn AccountStore>,
    pub routing_config: RoutingConfig,
}

impl Services {
    pub fn new(
        geocoder: Arc<Geocoder>,
        routing_pool: Arc<RoutingPool>,
        queue: Arc<dyn TripQueue>,
        result_store: Arc<dyn ResultStore>,
        account_store: Arc<dyn AccountStore>,
        routing_config: RoutingConfig,
    ) -> Self {
        describe_counter!(
            "trasa.rpc.requests.count",
            "JSON-RPC calls dispatched, by method and outcome"
        );
        Services {
            geocoder,
            routing_pool,
            queue,
            result_store,
            account_store,
            routing_config,
        }
    }

    /// Dispatch one JSON-RPC `method` call. `None` means the method is not
    /// in the service map (`not_implemented`).
    #[instrument(name = "Services::dispatch", skip(self, params, ctx), fields(method = %method))]
    pub async fn dispatch(
        &self,
        method: &str,
        params: &Value,
        ctx: &RequestContext,
    ) -> Result<Value, ServiceError> {
        self.record_device(ctx).await;

        let result = match method {
            "trip" => self.trip(params, ctx).await,
            "trip.async" => self.trip_async(params, ctx).await,
            "trip.poll" => self.trip_poll(params, ctx).await,
            "geocode" => self.geocode(params, ctx),
            "distance" => self.distance(params).await,
            other => Err(ServiceError::not_implemented(format!("no such method: {other}"))),
        };

        counter!(
            "trasa.rpc.requests.count",
            1,
            "method" => method.to_owned(),
            "outcome" => if result.is_ok() { "ok" } else { "error" },
        );
        result
    }

    /// Best-effort device registration on every authenticated contact,
    /// never blocking the request on its own write (§3 account expansion).
    async fn record_device(&self, ctx: &RequestContext) {
        let mut account = self
            .account_store
            .get(&ctx.uid)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| crate::model::Account::new(ctx.uid.clone()));
        account.record_device(ctx.remote_endpoint.to_string(), ctx.idp.clone());
        if let Err(err) = self.account_store.put(&account).await {
            tracing::warn!("could not record device for {}: {:?}", ctx.uid, err);
        }
    }

    fn parse_trip(&self, params: &Value) -> Result<(UnoptimizedTrip, Coordinates), ServiceError> {
        let location = params
            .get("location")
            .ok_or_else(|| ServiceError::bad_request("missing location"))?;
        let location = Coordinates::from_json(location)
            .map_err(|err| ServiceError::bad_request(err.to_string()))?;

        let waypoints_json = params
            .get("waypoints")
            .and_then(Value::as_array)
            .ok_or_else(|| ServiceError::bad_request("missing waypoints"))?;
        let waypoints: Vec<Waypoint> = waypoints_json
            .iter()
            .map(|w| serde_json::from_value(w.clone()))
            .collect::<Result<_, _>>()
            .map_err(|err| ServiceError::bad_request(format!("malformed waypoint: {err}")))?;

        let trip = UnoptimizedTrip::new(waypoints)
            .map_err(|err| ServiceError::invalid_argument(err.to_string()))?;
        Ok((trip, location))
    }

    /// Validate a parsed trip against `max_waypoints` and the single-region
    /// invariant, returning the region name on success.
    fn validate_trip(&self, trip: &UnoptimizedTrip, location: Coordinates) -> Result<String, ServiceError> {
        if trip.len() > self.routing_config.max_waypoints {
            return Err(ServiceError::invalid_argument(format!(
                "trip has {} waypoints, exceeding the configured maximum of {}",
                trip.len(),
                self.routing_config.max_waypoints
            )));
        }

        let locator = self.geocoder.locator();
        let trip_region = locator
            .locate(location)
            .ok_or_else(|| ServiceError::invalid_argument("unsupported location"))?;

        for waypoint in trip.waypoints() {
            let waypoint_region = locator
                .locate(waypoint.building.coords)
                .ok_or_else(|| ServiceError::invalid_argument("waypoint outside any known region"))?;
            if waypoint_region.name() != trip_region.name() {
                return Err(ServiceError::invalid_argument("trip spans more than one region"));
            }
        }

        Ok(trip_region.name().to_owned())
    }

    async fn trip(&self, params: &Value, ctx: &RequestContext) -> Result<Value, ServiceError> {
        let (trip, location) = self.parse_trip(params)?;
        let region = self.validate_trip(&trip, location)?;

        let meta = TripMetadata {
            id: Some(new_sync_trip_id()),
            receipt_handle: None,
            region: region.clone(),
            account_id: ctx.uid.clone(),
            created_at: chrono::Utc::now(),
        };

        let optimized = self
            .routing_pool
            .optimize_trip(&trip, &region)
            .await
            .map_err(ServiceError::from)?;

        tracking::emit(&ctx.uid, &region, "trip.completed");

        Ok(json!({
            "id": meta.id,
            "waypoints": optimized.waypoints,
            "legs": optimized.legs,
            "geometry": optimized.geometry,
            "total_cost": optimized.total_cost(),
        }))
    }

    async fn trip_async(&self, params: &Value, ctx: &RequestContext) -> Result<Value, ServiceError> {
        let (trip, location) = self.parse_trip(params)?;
        let region = self.validate_trip(&trip, location)?;

        let promise = self
            .queue
            .schedule_trip(trip, &region, &ctx.uid)
            .await
            .map_err(ServiceError::from)?;

        tracking::emit(&ctx.uid, &region, "trip.scheduled");

        Ok(json!({
            "id": promise.id,
            "scheduled_at": promise.scheduled_at,
            "expected_at": promise.expected_at,
        }))
    }

    async fn trip_poll(&self, params: &Value, ctx: &RequestContext) -> Result<Value, ServiceError> {
        let trip_id = params
            .get("tripid")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::bad_request("missing tripid"))?;

        let record = self
            .result_store
            .get(trip_id)
            .await
            .map_err(ServiceError::from)?;

        let Some(record) = record else {
            return Ok(json!({ "id": trip_id, "status": "pending" }));
        };

        if record.account_id != ctx.uid {
            return Err(ServiceError::not_authorized("trip belongs to a different account"));
        }

        Ok(match record.status {
            crate::model::TripStatus::Pending => json!({ "id": record.id, "status": "pending" }),
            crate::model::TripStatus::Ready => json!({
                "id": record.id,
                "status": "ready",
                "response": record.response_json,
                "geometry": record.geometry,
                "distance": record.distance,
                "duration": record.duration,
            }),
            crate::model::TripStatus::Failed => json!({
                "id": record.id,
                "status": "failed",
                "error": record.error,
            }),
        })
    }

    fn geocode(&self, params: &Value, ctx: &RequestContext) -> Result<Value, ServiceError> {
        let text = params
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::bad_request("missing text"))?;
        let location = params
            .get("location")
            .ok_or_else(|| ServiceError::bad_request("missing location"))?;
        let location = Coordinates::from_json(location)
            .map_err(|err| ServiceError::bad_request(err.to_string()))?;
        let overrides: AddressComponents = match params.get("components") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|err| ServiceError::bad_request(format!("malformed components: {err}")))?,
            None => AddressComponents::default(),
        };

        let (region, result) = self.geocoder.lookup(location, text, &overrides)?;
        tracking::emit(&ctx.uid, &region, "geocode.query");

        Ok(json!({
            "region": region,
            "matches": result.matches,
            "hints": result.hints,
        }))
    }

    async fn distance(&self, params: &Value) -> Result<Value, ServiceError> {
        let from = params
            .get("from")
            .ok_or_else(|| ServiceError::bad_request("missing from"))?;
        let to = params
            .get("to")
            .ok_or_else(|| ServiceError::bad_request("missing to"))?;
        let from = Coordinates::from_json(from).map_err(|err| ServiceError::bad_request(err.to_string()))?;
        let to = Coordinates::from_json(to).map_err(|err| ServiceError::bad_request(err.to_string()))?;

        let locator = self.geocoder.locator();
        let from_region = locator
            .locate(from)
            .ok_or_else(|| ServiceError::bad_request("'from' is outside any known region"))?;
        let to_region = locator
            .locate(to)
            .ok_or_else(|| ServiceError::bad_request("'to' is outside any known region"))?;
        if from_region.name() != to_region.name() {
            return Err(ServiceError::bad_request("'from' and 'to' are in different regions"));
        }

        let cost = self
            .routing_pool
            .distance(from, to, from_region.name())
            .await
            .map_err(ServiceError::from)?;

        Ok(json!({
            "meters": cost.distance_meters,
            "seconds": cost.duration_seconds,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use geo_types::{coord, LineString, Polygon};

    use crate::config::RoutingAlgorithm;
    use crate::geocoder::backends::{radix::RadixBackend, AddressBookBackend};
    use crate::geocoder::decomposer::NullLabelModel;
    use crate::model::{Account, Building, PersistedTripRecord, TripMetadata, TripPromise, Waypoint};
    use crate::routing::RoutingPool;
    use crate::scheduler::{TripQueue, TripRequest};
    use crate::spacial::{Coordinates, Region, RegionLocator};
    use crate::store::{AccountStore, ResultStore};

    use super::*;

    /// None of these traits are exercised by `validate_trip`; every method
    /// is unreachable from these tests.
    struct UnusedQueue;
    #[async_trait]
    impl TripQueue for UnusedQueue {
        async fn pending_count(&self) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn schedule_trip(&self, _trip: UnoptimizedTrip, _region: &str, _account_id: &str) -> crate::Result<TripPromise> {
            unimplemented!()
        }
        async fn poll_trip_request(&self) -> crate::Result<Option<TripRequest>> {
            unimplemented!()
        }
        async fn complete_trip(&self, _meta: &TripMetadata) -> crate::Result<()> {
            unimplemented!()
        }
        async fn discard_trip(&self, _meta: &TripMetadata) -> crate::Result<()> {
            unimplemented!()
        }
    }

    struct UnusedStore;
    #[async_trait]
    impl ResultStore for UnusedStore {
        async fn put(&self, _record: &PersistedTripRecord) -> crate::Result<()> {
            unimplemented!()
        }
        async fn get(&self, _id: &str) -> crate::Result<Option<PersistedTripRecord>> {
            unimplemented!()
        }
    }
    #[async_trait]
    impl AccountStore for UnusedStore {
        async fn get(&self, _uid: &str) -> crate::Result<Option<Account>> {
            unimplemented!()
        }
        async fn put(&self, _account: &Account) -> crate::Result<()> {
            unimplemented!()
        }
    }

    fn square_region(name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
        let ring = LineString(vec![
            coord! { x: x0, y: y0 },
            coord! { x: x0, y: y1 },
            coord! { x: x1, y: y1 },
            coord! { x: x1, y: y0 },
            coord! { x: x0, y: y0 },
        ]);
        Region::new(name, Polygon::new(ring, vec![]))
    }

    fn waypoint(id: i64, lat: f64, lng: f64) -> Waypoint {
        Waypoint {
            building: Building::new(id, Coordinates::new(lat, lng), "PL", "Bialystok", "15-318", "Wiejska", "1"),
            phone: None,
            input_method: None,
            notes: None,
        }
    }

    /// Two disjoint regions plus a routing pool with no engines (`trip`'s
    /// engine dispatch is never reached by `validate_trip` itself).
    fn services_with_max_waypoints(max_waypoints: usize) -> Services {
        let locator = RegionLocator::build(vec![
            square_region("podlaskie", 20.0, 50.0, 26.0, 55.0),
            square_region("mazowieckie", 0.0, 0.0, 10.0, 10.0),
        ])
        .unwrap();
        let geocoder = Arc::new(crate::geocoder::Geocoder::new(
            locator,
            Box::new(NullLabelModel),
            AddressBookBackend::Radix(RadixBackend::new()),
        ));
        let routing_pool = Arc::new(RoutingPool::new(HashMap::new()));

        Services::new(
            geocoder,
            routing_pool,
            Arc::new(UnusedQueue),
            Arc::new(UnusedStore),
            Arc::new(UnusedStore),
            RoutingConfig {
                algorithm: RoutingAlgorithm::Ch,
                max_waypoints,
                async_threshold: 8,
                worker_concurrency: 4,
                engine_base_url: "http://localhost:5000".to_owned(),
            },
        )
    }

    #[test]
    fn validate_trip_rejects_a_trip_exceeding_max_waypoints() {
        let services = services_with_max_waypoints(2);
        let trip = UnoptimizedTrip::new(vec![
            waypoint(1, 53.1, 23.1),
            waypoint(2, 53.2, 23.2),
            waypoint(3, 53.3, 23.3),
        ])
        .unwrap();

        let err = services.validate_trip(&trip, Coordinates::new(53.1, 23.1)).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[test]
    fn validate_trip_rejects_waypoints_spanning_more_than_one_region() {
        let services = services_with_max_waypoints(25);
        let trip = UnoptimizedTrip::new(vec![
            waypoint(1, 53.1, 23.1),  // podlaskie
            waypoint(2, 5.0, 5.0),    // mazowieckie
            waypoint(3, 53.3, 23.3),  // podlaskie
        ])
        .unwrap();

        let err = services.validate_trip(&trip, Coordinates::new(53.1, 23.1)).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[test]
    fn validate_trip_accepts_a_well_formed_single_region_trip() {
        let services = services_with_max_waypoints(25);
        let trip = UnoptimizedTrip::new(vec![
            waypoint(1, 53.1, 23.1),
            waypoint(2, 53.2, 23.2),
            waypoint(3, 53.3, 23.3),
        ])
        .unwrap();

        let region = services.validate_trip(&trip, Coordinates::new(53.1, 23.1)).unwrap();
        assert_eq!(region, "podlaskie");
    }
}
