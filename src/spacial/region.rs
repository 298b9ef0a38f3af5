//! A named, polygon-bounded geographic area.

use geo::algorithm::Contains;
use geo_types::Polygon;

use super::coords::Coordinates;

/// An immutable `(name, polygon)` pair. Built once at process start and
/// shared read-only afterwards.
#[derive(Clone, Debug)]
pub struct Region {
    name: String,
    polygon: Polygon<f64>,
}

impl Region {
    /// Build a region from its name and ring of coordinates. The polygon
    /// must be non-empty; callers (the poly-file loader) are responsible for
    /// that invariant.
    pub fn new(name: impl Into<String>, polygon: Polygon<f64>) -> Self {
        Region {
            name: name.into(),
            polygon,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Does this region contain `point`, by exact polygon containment?
    pub fn contains(&self, point: Coordinates) -> bool {
        self.polygon.contains(&geo_types::Coord::from(point))
    }
}

impl PartialEq for Region {
    /// Regions are compared by name: the locator guarantees names are
    /// unique, so identity and name-equality coincide.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, LineString};

    fn square_region(name: &str) -> Region {
        let ring = LineString(vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 0.0, y: 10.0 },
            coord! { x: 10.0, y: 10.0 },
            coord! { x: 10.0, y: 0.0 },
            coord! { x: 0.0, y: 0.0 },
        ]);
        Region::new(name, Polygon::new(ring, vec![]))
    }

    #[test]
    fn contains_tests_exact_polygon() {
        let region = square_region("podlaskie");
        assert!(region.contains(Coordinates::new(5.0, 5.0)));
        assert!(!region.contains(Coordinates::new(50.0, 50.0)));
    }
}
