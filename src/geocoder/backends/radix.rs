//! Variant B: an in-memory, prefix-queryable index.
//!
//! The original system's `prefix_tree_backend` never finished this: its
//! constructor and `lookup()` both unconditionally threw
//! `std::logic_error("... implementation is disabled now. use sqlite_fts
//! instead")`. The distilled specification, however, gives this variant a
//! complete, real contract (two-level `street -> city -> street-index`,
//! `seal()`, additive insert with silent dedup) — so unlike the source
//! system, this backend is fully functional here; see `DESIGN.md` for the
//! resolution of this discrepancy.
//!
//! Prefix queries over street names and building numbers use `BTreeMap`
//! range scans rather than a hand-rolled trie: a sorted map already gives
//! contiguous prefix ranges in O(log n + k), which is all "radix tree" ever
//! bought us here.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Context, Result};

use crate::model::{AddressComponents, Building};
use crate::spacial::Coordinates;

use super::Backend;

#[derive(Clone)]
struct Entry {
    building: Building,
}

/// `number -> entry`, scoped to one `(region, street, city)` triple.
type StreetIndex = BTreeMap<String, Entry>;

/// `city -> street-index`, scoped to one `(region, street)` pair.
type CityMap = BTreeMap<String, StreetIndex>;

/// `street name -> city map`, scoped to one region.
#[derive(Default)]
struct RegionIndex {
    streets: BTreeMap<String, CityMap>,
}

/// The in-memory radix/prefix-tree address book.
pub struct RadixBackend {
    regions: RwLock<BTreeMap<String, RegionIndex>>,
    sealed: AtomicBool,
}

impl Default for RadixBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RadixBackend {
    pub fn new() -> Self {
        RadixBackend {
            regions: RwLock::new(BTreeMap::new()),
            sealed: AtomicBool::new(false),
        }
    }

    /// Insert one building under `(region, street, city, number)`.
    /// Additive: a duplicate `(street, city, number)` triple for the same
    /// region is silently dropped (buildings with multiple coordinates,
    /// e.g. large complexes, are folded into the first entry).
    ///
    /// Validates that `coords`, `city`, `street`, and `number` are all
    /// non-empty before inserting.
    pub fn insert(
        &mut self,
        region: &str,
        street: &str,
        city: &str,
        number: &str,
        building: Building,
    ) -> Result<()> {
        debug_assert!(
            !self.sealed.load(Ordering::Relaxed),
            "insert() called after seal()"
        );
        if building.coords.is_empty() || city.is_empty() || street.is_empty() || number.is_empty()
        {
            bail!("building insert requires non-empty coords/city/street/number");
        }

        let mut regions = self.regions.write().expect("radix backend lock poisoned");
        let region_index = regions.entry(region.to_owned()).or_default();
        let city_map = region_index
            .streets
            .entry(normalize(street))
            .or_default();
        let street_index = city_map.entry(normalize(city)).or_default();
        street_index
            .entry(normalize(number))
            .or_insert(Entry { building });
        Ok(())
    }

    /// Bulk-load one region's address book CSV (§6): semicolon-delimited
    /// `id;longitude;latitude;country;city;zipcode;street;number`, no
    /// header row. Rows with empty coordinates or an empty city/street/
    /// number are silently skipped rather than failing the whole load.
    pub fn load_csv(&mut self, region: &str, reader: impl Read) -> Result<()> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        for result in rdr.records() {
            let record = result.context("malformed address book CSV row")?;
            if record.len() < 8 {
                continue;
            }
            let id: i64 = match record[0].parse() {
                Ok(id) => id,
                Err(_) => continue,
            };
            let longitude: f64 = match record[1].parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let latitude: f64 = match record[2].parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let country = &record[3];
            let city = &record[4];
            let zipcode = &record[5];
            let street = &record[6];
            let number = &record[7];

            let coords = Coordinates::new(latitude, longitude);
            if coords.is_empty() || city.is_empty() || street.is_empty() || number.is_empty() {
                continue;
            }

            let building = Building::new(id, coords, country, city, zipcode, street, number);
            self.insert(region, street, city, number, building)?;
        }
        Ok(())
    }

    /// Mark the backend read-only. Purely advisory here — there is no
    /// separate "optimized" representation to switch to — but `insert`
    /// asserts it is never called again afterward, matching the distilled
    /// contract.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Relaxed);
    }

    /// Total number of distinct `(street, city, number)` entries across all
    /// regions. Used by the address-book insert-idempotence test.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.regions
            .read()
            .expect("radix backend lock poisoned")
            .values()
            .flat_map(|r| r.streets.values())
            .flat_map(|c| c.values())
            .map(|s| s.len())
            .sum()
    }
}

fn normalize(value: &str) -> String {
    value.to_lowercase()
}

/// Inclusive-prefix range over a sorted map's keys.
fn prefix_range<'a, V>(
    map: &'a BTreeMap<String, V>,
    prefix: &str,
) -> impl Iterator<Item = (&'a String, &'a V)> {
    let prefix = prefix.to_owned();
    let upper = prefix_upper_bound(&prefix);
    map.range(prefix.clone()..upper).filter(move |(k, _)| k.starts_with(&prefix))
}

/// The lexicographically-smallest string greater than every string starting
/// with `prefix`, used as the exclusive upper bound of a prefix range.
fn prefix_upper_bound(prefix: &str) -> String {
    let mut upper: Vec<char> = prefix.chars().collect();
    while let Some(last) = upper.pop() {
        if let Some(next) = char::from_u32(last as u32 + 1) {
            upper.push(next);
            return upper.into_iter().collect();
        }
    }
    // `prefix` was empty or made entirely of `char::MAX`: no finite upper
    // bound, so just scan everything.
    "\u{10FFFF}\u{10FFFF}".to_owned()
}

impl Backend for RadixBackend {
    fn building_matches(
        &self,
        region: &str,
        street: &str,
        number: &str,
        city: Option<&str>,
        zipcode: Option<&str>,
    ) -> Result<Vec<Building>> {
        let regions = self.regions.read().expect("radix backend lock poisoned");
        let Some(region_index) = regions.get(region) else {
            return Ok(Vec::new());
        };

        let street_prefix = normalize(street);
        let number_prefix = normalize(number);
        let city_filter = city.map(normalize);

        let mut matches = Vec::new();
        for (_, city_map) in prefix_range(&region_index.streets, &street_prefix) {
            for (city_name, street_index) in city_map {
                if let Some(wanted) = &city_filter {
                    if city_name != wanted {
                        continue;
                    }
                }
                for (_, entry) in prefix_range(street_index, &number_prefix) {
                    if let Some(zip) = zipcode {
                        if entry.building.zipcode != zip {
                            continue;
                        }
                    }
                    matches.push(entry.building.clone());
                }
            }
        }
        matches.sort_by(|a, b| (&a.city, &a.number).cmp(&(&b.city, &b.number)));
        Ok(matches)
    }

    fn street_hints(
        &self,
        region: &str,
        street: &str,
        city: Option<&str>,
    ) -> Result<Vec<AddressComponents>> {
        let regions = self.regions.read().expect("radix backend lock poisoned");
        let Some(region_index) = regions.get(region) else {
            return Ok(Vec::new());
        };

        let street_prefix = normalize(street);
        let city_filter = city.map(normalize);

        let mut hints = Vec::new();
        for (street_name, city_map) in prefix_range(&region_index.streets, &street_prefix) {
            for (city_name, street_index) in city_map {
                if let Some(wanted) = &city_filter {
                    if city_name != wanted {
                        continue;
                    }
                }
                if street_index.is_empty() {
                    continue;
                }
                // Recover a display form: we normalize keys to lowercase for
                // sorting, but we can take the casing from any entry.
                let sample = street_index.values().next().unwrap();
                hints.push(AddressComponents {
                    city: Some(sample.building.city.clone()),
                    street: Some(sample.building.street.clone()),
                    building: None,
                    zipcode: None,
                });
                let _ = street_name;
            }
        }
        hints.sort_by(|a, b| (&a.street, &a.city).cmp(&(&b.street, &b.city)));
        hints.dedup();
        Ok(hints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spacial::Coordinates;

    fn sample_building(id: i64, city: &str) -> Building {
        Building::new(
            id,
            Coordinates::new(53.1, 23.1),
            "PL",
            city,
            "15-318",
            "Wiejska",
            "35a",
        )
    }

    #[test]
    fn insert_is_idempotent_on_duplicate_triple() {
        let mut backend = RadixBackend::new();
        backend
            .insert("podlaskie", "Wiejska", "Bialystok", "35A", sample_building(1, "Bialystok"))
            .unwrap();
        backend
            .insert("podlaskie", "Wiejska", "Bialystok", "35A", sample_building(2, "Bialystok"))
            .unwrap();
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn building_matches_scoped_to_region_and_prefix() {
        let mut backend = RadixBackend::new();
        backend
            .insert("podlaskie", "Wiejska", "Bialystok", "35A", sample_building(1, "Bialystok"))
            .unwrap();
        let matches = backend
            .building_matches("podlaskie", "Wiej", "35", None, None)
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, 1);

        assert!(backend
            .building_matches("mazowieckie", "Wiej", "35", None, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn load_csv_skips_rows_with_empty_required_fields() {
        let mut backend = RadixBackend::new();
        let csv = "\
1;23.145556;53.135278;PL;Bialystok;15-318;Wiejska;35a
2;;;PL;;15-318;;
3;23.2;53.2;PL;Bialystok;15-318;Lipowa;1
";
        backend.load_csv("podlaskie", csv.as_bytes()).unwrap();
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn insert_rejects_empty_fields() {
        let mut backend = RadixBackend::new();
        let building = Building::new(1, Coordinates::new(0.0, 0.0), "PL", "", "", "", "");
        assert!(backend
            .insert("podlaskie", "Wiejska", "Bialystok", "35A", building)
            .is_err());
    }
}
