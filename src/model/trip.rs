//! Waypoints and trips: the unoptimized request shape, the optimized
//! response shape, and the metadata/promise/record types that travel with a
//! trip through the scheduler and result store.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Building;

/// One stop on a trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub building: Building,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// An ordered sequence of >= 3 waypoints with a designated first (starting)
/// and last (final) entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnoptimizedTrip {
    waypoints: Vec<Waypoint>,
}

impl UnoptimizedTrip {
    /// Build a trip, enforcing the minimum-length invariant.
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self> {
        if waypoints.len() < 3 {
            bail!("a trip requires at least 3 waypoints, got {}", waypoints.len());
        }
        Ok(UnoptimizedTrip { waypoints })
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn starting(&self) -> &Waypoint {
        self.waypoints.first().expect("trip has >= 3 waypoints")
    }

    pub fn final_waypoint(&self) -> &Waypoint {
        self.waypoints.last().expect("trip has >= 3 waypoints")
    }

    /// A trip is a roundtrip iff its final waypoint's building equals its
    /// starting waypoint's building.
    pub fn is_roundtrip(&self) -> bool {
        self.starting().building.id == self.final_waypoint().building.id
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// Travel cost of a leg or a whole trip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TravelCost {
    pub distance_meters: i64,
    pub duration_seconds: i64,
}

impl std::ops::Add for TravelCost {
    type Output = TravelCost;
    fn add(self, rhs: TravelCost) -> TravelCost {
        TravelCost {
            distance_meters: self.distance_meters + rhs.distance_meters,
            duration_seconds: self.duration_seconds + rhs.duration_seconds,
        }
    }
}

/// One edge of an optimized trip's visiting order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub from_building: i64,
    pub to_building: i64,
    pub cost: TravelCost,
}

/// An unoptimized trip plus the engine's chosen visiting order, per-leg
/// costs, and a serialized polyline of the full geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizedTrip {
    pub waypoints: Vec<Waypoint>,
    pub legs: Vec<RouteLeg>,
    pub geometry: String,
}

impl OptimizedTrip {
    /// The element-wise sum of every leg's cost.
    pub fn total_cost(&self) -> TravelCost {
        self.legs
            .iter()
            .fold(TravelCost::default(), |acc, leg| acc + leg.cost)
    }
}

/// Reorder `waypoints` in place according to `permutation`, where
/// `permutation[i]` is the index (in the original order) that should end up
/// at position `i`. O(n), allocation-free in-place cycle walk — do not
/// rebuild the sequence via a second allocation (see design notes).
pub fn reorder_by_permutation<T>(items: &mut [T], permutation: &mut [usize]) {
    debug_assert_eq!(items.len(), permutation.len());
    for i in 0..permutation.len() {
        while permutation[i] != i {
            let j = permutation[i];
            items.swap(i, j);
            permutation.swap(i, j);
        }
    }
}

/// Mint a synchronous trip id: `s_` + 16 random alphanumerics. Async trips
/// instead take the id assigned by the queue, so the `s_` prefix alone
/// guarantees the two id spaces never collide.
pub fn new_sync_trip_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("s_{suffix}")
}

/// Metadata carried alongside a trip from admission through completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_handle: Option<String>,
    pub region: String,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
}

/// Handed back to an async caller so it can later poll by id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripPromise {
    pub id: String,
    pub scheduled_at: DateTime<Utc>,
    pub expected_at: DateTime<Utc>,
}

/// Terminal or pending status of a persisted trip record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,
    Ready,
    Failed,
}

/// The `trips` result-store schema, keyed by `id`. Never mutated once in a
/// terminal state (`Ready` or `Failed`); a second write with the same id and
/// the same content (at-least-once redelivery) is harmless.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedTripRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub account_id: String,
    pub status: TripStatus,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PersistedTripRecord {
    pub fn pending(id: impl Into<String>, account_id: impl Into<String>, region: impl Into<String>) -> Self {
        PersistedTripRecord {
            id: id.into(),
            timestamp: Utc::now(),
            account_id: account_id.into(),
            status: TripStatus::Pending,
            region: region.into(),
            request_json: None,
            response_json: None,
            geometry: None,
            distance: None,
            duration: None,
            error: None,
        }
    }

    pub fn ready(
        id: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
        response_json: Value,
        geometry: String,
        total_cost: TravelCost,
    ) -> Self {
        PersistedTripRecord {
            id: id.into(),
            timestamp: Utc::now(),
            account_id: account_id.into(),
            status: TripStatus::Ready,
            region: region.into(),
            request_json: None,
            response_json: Some(response_json),
            geometry: Some(geometry),
            distance: Some(total_cost.distance_meters),
            duration: Some(total_cost.duration_seconds),
            error: None,
        }
    }

    pub fn failed(
        id: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        PersistedTripRecord {
            id: id.into(),
            timestamp: Utc::now(),
            account_id: account_id.into(),
            status: TripStatus::Failed,
            region: region.into(),
            request_json: None,
            response_json: None,
            geometry: None,
            distance: None,
            duration: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spacial::Coordinates;

    fn waypoint(id: i64) -> Waypoint {
        Waypoint {
            building: Building::new(id, Coordinates::new(53.0, 23.0), "PL", "Bialystok", "15-318", "Wiejska", "1"),
            phone: None,
            input_method: None,
            notes: None,
        }
    }

    #[test]
    fn roundtrip_detected_by_matching_building_ids() {
        let open = UnoptimizedTrip::new(vec![waypoint(1), waypoint(2), waypoint(3)]).unwrap();
        assert!(!open.is_roundtrip());

        let round = UnoptimizedTrip::new(vec![waypoint(1), waypoint(2), waypoint(1)]).unwrap();
        assert!(round.is_roundtrip());
    }

    #[test]
    fn rejects_fewer_than_three_waypoints() {
        assert!(UnoptimizedTrip::new(vec![waypoint(1), waypoint(2)]).is_err());
    }

    #[test]
    fn reorder_cycle_walk_matches_permutation() {
        let mut items = vec!['a', 'b', 'c', 'd'];
        // Position i should end up holding original index permutation[i].
        let mut permutation = vec![2, 0, 3, 1];
        reorder_by_permutation(&mut items, &mut permutation);
        assert_eq!(items, vec!['c', 'a', 'd', 'b']);
    }

    #[test]
    fn total_cost_is_elementwise_sum_of_legs() {
        let trip = OptimizedTrip {
            waypoints: vec![waypoint(1), waypoint(2)],
            legs: vec![
                RouteLeg { from_building: 1, to_building: 2, cost: TravelCost { distance_meters: 100, duration_seconds: 10 } },
                RouteLeg { from_building: 2, to_building: 1, cost: TravelCost { distance_meters: 50, duration_seconds: 5 } },
            ],
            geometry: "poly".into(),
        };
        let total = trip.total_cost();
        assert_eq!(total.distance_meters, 150);
        assert_eq!(total.duration_seconds, 15);
    }

    #[test]
    fn sync_trip_id_has_expected_shape() {
        let id = new_sync_trip_id();
        assert!(id.starts_with("s_"));
        assert_eq!(id.len(), 18);
    }
}
