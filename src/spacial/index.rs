//! Classifies a point to exactly one region.
//!
//! Grounded in the original system's `boost::geometry::index::rtree<...,
//! rstar<16>>` over region envelopes: the tree only narrows candidates, the
//! final answer always comes from an exact polygon containment test.

use anyhow::{bail, Result};
use geo::algorithm::BoundingRect;
use rstar::{RTree, RTreeObject, AABB};

use super::{coords::Coordinates, region::Region};

/// One entry in the R-tree: a region's bounding box plus its index into the
/// locator's owned `Vec<Region>`.
struct RegionEnvelope {
    envelope: AABB<[f64; 2]>,
    index: usize,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// An immutable bag of regions with a bounding-box R-tree of their
/// envelopes.
///
/// Invariant: for any point, at most one region contains it (ties are not
/// expected in practice and are resolved by insertion order if they ever
/// occur). The locator's lookup returns that region, or nothing — it never
/// fails.
pub struct RegionLocator {
    regions: Vec<Region>,
    tree: RTree<RegionEnvelope>,
}

impl RegionLocator {
    /// Build a locator from a list of regions. Fails if two regions share a
    /// name, mirroring the original's `invalid_argument("duplicate
    /// region")`.
    pub fn build(regions: Vec<Region>) -> Result<Self> {
        for (i, region) in regions.iter().enumerate() {
            for other in &regions[..i] {
                if other.name() == region.name() {
                    bail!("duplicate region: {}", region.name());
                }
            }
        }

        let mut envelopes = Vec::with_capacity(regions.len());
        for (index, region) in regions.iter().enumerate() {
            let rect = region
                .polygon()
                .bounding_rect()
                .ok_or_else(|| anyhow::format_err!("region {} has an empty polygon", region.name()))?;
            let envelope = AABB::from_corners(
                [rect.min().x, rect.min().y],
                [rect.max().x, rect.max().y],
            );
            envelopes.push(RegionEnvelope { envelope, index });
        }

        Ok(RegionLocator {
            regions,
            tree: RTree::bulk_load(envelopes),
        })
    }

    /// Find the region containing `point`, if any.
    pub fn locate(&self, point: Coordinates) -> Option<&Region> {
        let query = [point.longitude, point.latitude];
        let mut candidates: Vec<&RegionEnvelope> =
            self.tree.locate_all_at_point(&query).collect();
        // Insertion order breaks ties between overlapping envelopes.
        candidates.sort_by_key(|c| c.index);
        candidates
            .into_iter()
            .map(|candidate| &self.regions[candidate.index])
            .find(|region| region.contains(point))
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, LineString, Polygon};

    fn square(name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
        let ring = LineString(vec![
            coord! { x: x0, y: y0 },
            coord! { x: x0, y: y1 },
            coord! { x: x1, y: y1 },
            coord! { x: x1, y: y0 },
            coord! { x: x0, y: y0 },
        ]);
        Region::new(name, Polygon::new(ring, vec![]))
    }

    #[test]
    fn locate_returns_containing_region_or_none() {
        let locator = RegionLocator::build(vec![
            square("podlaskie", 20.0, 50.0, 26.0, 55.0),
            square("mazowieckie", 0.0, 0.0, 10.0, 10.0),
        ])
        .unwrap();

        let found = locator.locate(Coordinates::new(53.135278, 23.145556));
        assert_eq!(found.map(Region::name), Some("podlaskie"));

        assert!(locator.locate(Coordinates::new(64.350823, 28.665475)).is_none());
    }

    #[test]
    fn build_rejects_duplicate_names() {
        let err = RegionLocator::build(vec![
            square("podlaskie", 0.0, 0.0, 1.0, 1.0),
            square("podlaskie", 2.0, 2.0, 3.0, 3.0),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate region"));
    }
}
