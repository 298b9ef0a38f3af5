//! Domain model shared across the geocoder and routing layers.

pub mod account;
pub mod address;
pub mod trip;

pub use account::{Account, DeviceRecord};
pub use address::{AddressComponents, Building};
pub use trip::{
    new_sync_trip_id, reorder_by_permutation, OptimizedTrip, PersistedTripRecord, RouteLeg,
    TravelCost, TripMetadata, TripPromise, TripStatus, UnoptimizedTrip, Waypoint,
};
