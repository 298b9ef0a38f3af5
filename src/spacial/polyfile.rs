//! Parser for the OSM Polygon Filter File Format, as consumed by the region
//! locator to build each [`super::region::Region`]'s polygon.
//!
//! Grounded in `to_polygon()` from the original system's spatial index: a
//! line-by-line, context-depth parser. Lines that don't start with
//! whitespace either open a new named sub-polygon (depth 0 -> 1) or close
//! the current context (`END`, popping one level); lines starting with
//! whitespace are coordinate lines, ingested only while inside the region
//! block whose header matches the requested region name (case-
//! insensitively, per the original's `boost::iequals`). A region's block may
//! nest more than one polygon-index sub-block (depth 1 -> 2); every one of
//! them is concatenated into the same ring, and the match only closes when
//! depth returns fully to 0.

use std::io::BufRead;

use anyhow::{bail, Result};
use geo_types::{coord, LineString, Polygon};

use super::coords::Coordinates;

/// Parse a poly-file, returning the ring for the sub-polygon whose header
/// equals `region_name`. The file stores `longitude latitude` per
/// coordinate line; we store `(latitude, longitude)` internally, per spec.
pub fn parse_region_polygon(
    reader: impl BufRead,
    region_name: &str,
) -> Result<Polygon<f64>> {
    let mut depth: usize = 0;
    let mut in_target = false;
    let mut coords: Vec<Coordinates> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let is_coordinate_line = line.starts_with(' ') || line.starts_with('\t');
        if is_coordinate_line {
            if in_target {
                coords.push(parse_coordinate_line(&line)?);
            }
            continue;
        }

        let trimmed = line.trim();
        if trimmed == "END" {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                // The enclosing region block just closed. If it was our
                // target, every sub-polygon it contains has already been
                // concatenated into `coords` and there is nothing more to
                // read; otherwise clear the flag before the next region
                // header is seen.
                if in_target {
                    break;
                }
                in_target = false;
            }
            continue;
        }

        // A header line: depth 0 -> 1 opens a region name; depth 1 -> 2 (or
        // deeper) opens a polygon index nested inside the already-matched
        // region and must not disturb `in_target`.
        if depth == 0 {
            in_target = trimmed.eq_ignore_ascii_case(region_name);
        }
        depth += 1;
    }

    if coords.is_empty() {
        bail!("region {:?} not found in poly file, or its ring was empty", region_name);
    }

    let mut ring: Vec<_> = coords
        .iter()
        .map(|c| coord! { x: c.longitude, y: c.latitude })
        .collect();
    if ring.first() != ring.last() {
        ring.push(ring[0]);
    }

    Ok(Polygon::new(LineString(ring), vec![]))
}

fn parse_coordinate_line(line: &str) -> Result<Coordinates> {
    let mut parts = line.split_whitespace();
    let lng: f64 = parts
        .next()
        .ok_or_else(|| anyhow::format_err!("missing longitude in poly file"))?
        .parse()?;
    let lat: f64 = parts
        .next()
        .ok_or_else(|| anyhow::format_err!("missing latitude in poly file"))?
        .parse()?;
    Ok(Coordinates::new(lat, lng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
podlaskie
1
 23.0 53.0
 23.0 54.0
 24.0 54.0
 24.0 53.0
 23.0 53.0
END
END
mazowieckie
1
 20.0 51.0
 20.0 52.0
 21.0 52.0
END
END
";

    const MULTI_PART_SAMPLE: &str = "\
podlaskie
1
 23.0 53.0
 23.0 54.0
END
2
 24.0 54.0
 24.0 53.0
 23.0 53.0
END
END
";

    #[test]
    fn ingests_only_the_named_subpolygon() {
        let polygon = parse_region_polygon(Cursor::new(SAMPLE), "podlaskie").unwrap();
        // The sample's 5 coordinate lines already repeat the first point last,
        // so the ring is closed as-is with no extra point appended.
        assert_eq!(polygon.exterior().0.len(), 5);
    }

    #[test]
    fn region_name_matches_case_insensitively() {
        let polygon = parse_region_polygon(Cursor::new(SAMPLE), "PodLaskie").unwrap();
        assert_eq!(polygon.exterior().0.len(), 5);
    }

    #[test]
    fn concatenates_every_subpolygon_index_under_the_same_region_name() {
        let polygon = parse_region_polygon(Cursor::new(MULTI_PART_SAMPLE), "podlaskie").unwrap();
        // Both polygon-index blocks (2 + 3 coordinate lines) belong to the
        // same region name and are folded into one ring.
        assert_eq!(polygon.exterior().0.len(), 5);
    }

    #[test]
    fn missing_region_is_an_error() {
        assert!(parse_region_polygon(Cursor::new(SAMPLE), "nope").is_err());
    }
}
