//! The address book backend: looks up candidate buildings for a parsed
//! address inside a region.
//!
//! A closed sum type selected once at construction from `geocoder.mode`
//! (§9 Design Notes: "implement as a sum type ... not as runtime virtual
//! dispatch with arbitrary extension").

pub mod fts;
pub mod radix;

use anyhow::Result;

use crate::model::{AddressComponents, Building};

use super::sanitize::sanitize_components;

/// Output of a backend lookup: addressable matches, or non-addressable
/// hints that narrow the search further.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LookupResult {
    pub matches: Vec<Building>,
    pub hints: Vec<AddressComponents>,
}

/// Per-variant capability: given sanitized, already-dispatched-on
/// components, return building matches or street hints. The dispatch
/// *policy* itself (§4.3) is shared and lives on [`AddressBookBackend`], not
/// here, since it's identical for every variant.
pub trait Backend: Send + Sync {
    fn building_matches(
        &self,
        region: &str,
        street: &str,
        number: &str,
        city: Option<&str>,
        zipcode: Option<&str>,
    ) -> Result<Vec<Building>>;

    fn street_hints(
        &self,
        region: &str,
        street: &str,
        city: Option<&str>,
    ) -> Result<Vec<AddressComponents>>;
}

/// The two interchangeable backends.
pub enum AddressBookBackend {
    Fts(fts::FtsBackend),
    Radix(radix::RadixBackend),
}

impl AddressBookBackend {
    fn inner(&self) -> &dyn Backend {
        match self {
            AddressBookBackend::Fts(b) => b,
            AddressBookBackend::Radix(b) => b,
        }
    }

    /// Shared dispatch policy (§4.3):
    /// - `building` set, `street` unset -> empty.
    /// - `building` and `street` set -> building matches.
    /// - `street` set, `building` unset -> street hints.
    /// - otherwise -> empty.
    pub fn lookup(&self, region: &str, components: &AddressComponents) -> Result<LookupResult> {
        let components = sanitize_components(components);

        match (&components.street, &components.building) {
            (Some(street), Some(number)) => {
                let matches = self.inner().building_matches(
                    region,
                    street,
                    number,
                    components.city.as_deref(),
                    components.zipcode.as_deref(),
                )?;
                Ok(LookupResult {
                    matches,
                    hints: Vec::new(),
                })
            }
            (Some(street), None) => {
                let hints =
                    self.inner()
                        .street_hints(region, street, components.city.as_deref())?;
                Ok(LookupResult {
                    matches: Vec::new(),
                    hints,
                })
            }
            _ => Ok(LookupResult::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoder::backends::radix::RadixBackend;
    use crate::spacial::Coordinates;

    fn backend() -> AddressBookBackend {
        let mut radix = RadixBackend::new();
        radix
            .insert(
                "podlaskie",
                "Wiejska",
                "Bialystok",
                "35A",
                Building::new(
                    1,
                    Coordinates::new(53.1, 23.1),
                    "PL",
                    "Bialystok",
                    "15-318",
                    "Wiejska",
                    "35a",
                ),
            )
            .unwrap();
        AddressBookBackend::Radix(radix)
    }

    #[test]
    fn building_without_street_is_empty() {
        let components = AddressComponents {
            building: Some("35a".into()),
            ..Default::default()
        };
        let result = backend().lookup("podlaskie", &components).unwrap();
        assert!(result.matches.is_empty());
        assert!(result.hints.is_empty());
    }

    #[test]
    fn street_only_yields_hints_not_matches() {
        let components = AddressComponents {
            street: Some("Wiejska".into()),
            ..Default::default()
        };
        let result = backend().lookup("podlaskie", &components).unwrap();
        assert!(result.matches.is_empty());
        assert!(!result.hints.is_empty());
    }
}
