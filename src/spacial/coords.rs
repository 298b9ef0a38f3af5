//! Geographic coordinates.

use geo_types::Coord;
use serde::{Deserialize, Serialize};

/// A point on the earth, in double-precision degrees.
///
/// "Empty" means both fields are `<= 0.0`; equality is bit-exact on both
/// fields (we never compare coordinates with a tolerance — two requests
/// either named the same building or they didn't).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinates {
            latitude,
            longitude,
        }
    }

    /// True if this coordinate carries no real location.
    pub fn is_empty(&self) -> bool {
        self.latitude <= 0.0 && self.longitude <= 0.0
    }

    /// Parse `{"latitude": .., "longitude": ..}` out of an arbitrary JSON
    /// value, the shape used throughout the JSON-RPC surface for `location`,
    /// `from`, and `to` parameters.
    pub fn from_json(value: &serde_json::Value) -> anyhow::Result<Self> {
        let latitude = value
            .get("latitude")
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| anyhow::format_err!("missing location.latitude"))?;
        let longitude = value
            .get("longitude")
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| anyhow::format_err!("missing location.longitude"))?;
        Ok(Coordinates::new(latitude, longitude))
    }
}

/// Registers [`Coordinates`] as a 2-D geographic point for `geo`/`rstar`.
impl From<Coordinates> for Coord<f64> {
    fn from(c: Coordinates) -> Self {
        // `geo` conventionally orders points (x, y) = (longitude, latitude).
        Coord {
            x: c.longitude,
            y: c.latitude,
        }
    }
}

impl From<Coord<f64>> for Coordinates {
    fn from(c: Coord<f64>) -> Self {
        Coordinates {
            latitude: c.y,
            longitude: c.x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_requires_both_fields_non_positive() {
        assert!(Coordinates::new(0.0, 0.0).is_empty());
        assert!(!Coordinates::new(53.13, 23.14).is_empty());
        assert!(!Coordinates::new(53.13, 0.0).is_empty());
    }

    #[test]
    fn from_json_round_trips() {
        let json = serde_json::json!({"latitude": 53.135278, "longitude": 23.145556});
        let coords = Coordinates::from_json(&json).unwrap();
        assert_eq!(coords.latitude, 53.135278);
        assert_eq!(coords.longitude, 23.145556);
    }
}
