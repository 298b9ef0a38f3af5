//! The routing engine pool: one routing-engine instance per region,
//! performing synchronous trip optimization and point-to-point distance
//! queries.

pub mod http_engine;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use thiserror::Error as ThisError;

use crate::model::{reorder_by_permutation, OptimizedTrip, RouteLeg, TravelCost, UnoptimizedTrip};
use crate::spacial::Coordinates;

pub use http_engine::HttpRoutingEngine;

/// Errors specific to the routing layer. Anything else (network I/O,
/// (de)serialization) propagates as plain `anyhow::Error` and becomes
/// `server_error` at the RPC boundary.
#[derive(Debug, ThisError)]
pub enum RoutingError {
    #[error("no routing engine configured for region {0:?}")]
    UnknownRegion(String),

    /// Any engine status other than OK, or an engine code not
    /// case-insensitively equal to `"ok"`.
    #[error("routing engine returned an error: {0}")]
    EngineStatus(String),
}

/// One waypoint's position in the engine's chosen visiting order, and which
/// "trip" (sub-tour) it belongs to — mirrors OSRM's `trips_index`/
/// `waypoint_index` pair, the shape this crate's HTTP engine speaks.
#[derive(Clone, Copy, Debug)]
pub struct EngineWaypoint {
    pub waypoint_index: usize,
    pub trips_index: usize,
}

/// One leg of the engine's chosen route.
#[derive(Clone, Debug)]
pub struct EngineLeg {
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

/// Raw response shape from the underlying routing engine, prior to being
/// reassembled into an [`OptimizedTrip`].
#[derive(Clone, Debug)]
pub struct EngineTripResult {
    /// One entry per input waypoint, giving its position in the optimized
    /// order.
    pub waypoints: Vec<EngineWaypoint>,
    pub legs: Vec<EngineLeg>,
    pub geometry: String,
}

/// The contract a routing engine must satisfy. The underlying engine that
/// actually computes shortest paths through a road graph is out of scope
/// (§1) — only this request/response contract is ours.
#[async_trait]
pub trait RoutingEngine: Send + Sync {
    async fn optimize_trip(&self, trip: &UnoptimizedTrip) -> anyhow::Result<EngineTripResult>;
    async fn distance(&self, from: Coordinates, to: Coordinates) -> anyhow::Result<TravelCost>;
}

/// A map `region_name -> routing_engine_instance`, each bound to that
/// region's preprocessed index.
pub struct RoutingPool {
    engines: HashMap<String, Arc<dyn RoutingEngine>>,
}

impl RoutingPool {
    pub fn new(engines: HashMap<String, Arc<dyn RoutingEngine>>) -> Self {
        RoutingPool { engines }
    }

    fn engine_for(&self, region: &str) -> anyhow::Result<&Arc<dyn RoutingEngine>> {
        self.engines
            .get(region)
            .ok_or_else(|| RoutingError::UnknownRegion(region.to_owned()).into())
    }

    /// `optimize_trip(trip, region) -> optimized_trip`. For roundtrips, the
    /// engine is told "destination=any" conceptually (handled by the engine
    /// implementation); here we only strip the caller's trailing duplicate
    /// coordinate if present, since the engine omits the explicit return leg
    /// and expects only the distinct stops.
    pub async fn optimize_trip(&self, trip: &UnoptimizedTrip, region: &str) -> anyhow::Result<OptimizedTrip> {
        let engine = self.engine_for(region)?;
        let is_roundtrip = trip.is_roundtrip();

        let engine_input = if is_roundtrip {
            strip_trailing_duplicate(trip)?
        } else {
            trip.clone()
        };

        let result = engine.optimize_trip(&engine_input).await?;

        let expected_waypoints = if is_roundtrip {
            engine_input.len()
        } else {
            trip.len()
        };
        if result.waypoints.len() != expected_waypoints {
            bail!(
                "routing engine returned {} waypoints, expected {}",
                result.waypoints.len(),
                expected_waypoints
            );
        }
        let expected_legs = trip.len() - 1;
        if result.legs.len() != expected_legs {
            bail!(
                "routing engine returned {} legs, expected {}",
                result.legs.len(),
                expected_legs
            );
        }

        let mut waypoints = engine_input.waypoints().to_vec();
        let mut permutation: Vec<usize> = result
            .waypoints
            .iter()
            .map(|w| w.waypoint_index)
            .collect();
        reorder_by_permutation(&mut waypoints, &mut permutation);

        let mut legs = Vec::with_capacity(result.legs.len());
        for (i, engine_leg) in result.legs.iter().enumerate() {
            let from_building = waypoints[i].building.id;
            let to_building = if is_roundtrip && i + 1 == result.legs.len() {
                waypoints[0].building.id
            } else {
                waypoints[i + 1].building.id
            };
            legs.push(RouteLeg {
                from_building,
                to_building,
                cost: TravelCost {
                    distance_meters: engine_leg.distance_meters.round() as i64,
                    duration_seconds: engine_leg.duration_seconds.round() as i64,
                },
            });
        }

        Ok(OptimizedTrip {
            waypoints,
            legs,
            geometry: result.geometry,
        })
    }

    pub async fn distance(&self, from: Coordinates, to: Coordinates, region: &str) -> anyhow::Result<TravelCost> {
        let engine = self.engine_for(region)?;
        engine.distance(from, to).await
    }
}

/// Strip a trailing waypoint that duplicates the starting building, which
/// callers sometimes include explicitly to spell out a roundtrip; the
/// engine is asked for an open tour back to the start and supplies the
/// return leg implicitly, so it must not also see the duplicate stop.
fn strip_trailing_duplicate(trip: &UnoptimizedTrip) -> anyhow::Result<UnoptimizedTrip> {
    let mut waypoints = trip.waypoints().to_vec();
    if waypoints.len() > 1
        && waypoints.last().unwrap().building.id == waypoints.first().unwrap().building.id
    {
        waypoints.pop();
    }
    UnoptimizedTrip::new(waypoints).context("roundtrip has fewer than 3 distinct waypoints")
}

#[cfg(test)]
pub mod fake_engine {
    //! A deterministic in-memory routing engine used only by tests.

    use super::*;
    use std::sync::Mutex;

    pub struct FakeRoutingEngine {
        pub permutation: Mutex<Vec<usize>>,
    }

    impl FakeRoutingEngine {
        /// An engine that returns waypoints in the same order it received
        /// them, with a fixed per-leg cost.
        pub fn identity() -> Self {
            FakeRoutingEngine {
                permutation: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RoutingEngine for FakeRoutingEngine {
        async fn optimize_trip(&self, trip: &UnoptimizedTrip) -> anyhow::Result<EngineTripResult> {
            let n = trip.len();
            let waypoints = (0..n)
                .map(|i| EngineWaypoint {
                    waypoint_index: i,
                    trips_index: 0,
                })
                .collect();
            let legs = (0..n.saturating_sub(1))
                .map(|_| EngineLeg {
                    distance_meters: 1000.0,
                    duration_seconds: 60.0,
                })
                .collect();
            Ok(EngineTripResult {
                waypoints,
                legs,
                geometry: "fake_polyline".into(),
            })
        }

        async fn distance(&self, _from: Coordinates, _to: Coordinates) -> anyhow::Result<TravelCost> {
            Ok(TravelCost {
                distance_meters: 1000,
                duration_seconds: 60,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake_engine::FakeRoutingEngine;
    use super::*;
    use crate::model::{Building, Waypoint};
    use crate::spacial::Coordinates;

    fn waypoint(id: i64) -> Waypoint {
        Waypoint {
            building: Building::new(id, Coordinates::new(53.0, 23.0), "PL", "Bialystok", "15-318", "Wiejska", "1"),
            phone: None,
            input_method: None,
            notes: None,
        }
    }

    fn pool_with(region: &str) -> RoutingPool {
        let mut engines: HashMap<String, Arc<dyn RoutingEngine>> = HashMap::new();
        engines.insert(region.to_owned(), Arc::new(FakeRoutingEngine::identity()));
        RoutingPool::new(engines)
    }

    #[tokio::test]
    async fn open_trip_has_n_minus_one_legs() {
        let pool = pool_with("podlaskie");
        let trip = UnoptimizedTrip::new(vec![waypoint(1), waypoint(2), waypoint(3)]).unwrap();
        let optimized = pool.optimize_trip(&trip, "podlaskie").await.unwrap();
        assert_eq!(optimized.legs.len(), 2);
        assert_eq!(optimized.legs[0].from_building, 1);
        assert_eq!(optimized.legs[1].to_building, 3);
    }

    #[tokio::test]
    async fn roundtrip_closes_last_leg_to_start() {
        let pool = pool_with("podlaskie");
        let trip = UnoptimizedTrip::new(vec![waypoint(1), waypoint(2), waypoint(1)]).unwrap();
        let optimized = pool.optimize_trip(&trip, "podlaskie").await.unwrap();
        assert_eq!(optimized.legs.len(), 2);
        assert_eq!(optimized.legs.last().unwrap().to_building, 1);
    }

    #[tokio::test]
    async fn unknown_region_fails() {
        let pool = pool_with("podlaskie");
        let trip = UnoptimizedTrip::new(vec![waypoint(1), waypoint(2), waypoint(3)]).unwrap();
        assert!(pool.optimize_trip(&trip, "mazowieckie").await.is_err());
    }
}
