//! The geocoder façade: orchestrates decompose -> locate -> backend-lookup,
//! applying caller overrides and the practical-adjust heuristic.

pub mod backends;
pub mod decomposer;
pub mod sanitize;

use thiserror::Error as ThisError;

use crate::model::AddressComponents;
use crate::spacial::{Coordinates, RegionLocator};

use backends::{AddressBookBackend, LookupResult};
use decomposer::LabelModel;

/// Façade-level failures. `UnsupportedLocation` is the one case the front
/// end must map to `invalid_argument` rather than `server_error`; a backend
/// I/O failure (§4.3's `backend_error`) is an unclassified downstream
/// failure and is wrapped verbatim.
#[derive(Debug, ThisError)]
pub enum GeocoderError {
    /// `user_location` did not fall inside any configured region.
    #[error("unsupported location")]
    UnsupportedLocation,

    /// The address book backend failed to answer the query.
    #[error("address book backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Ties the region locator, the decomposer, and an address book backend
/// together behind the single `lookup` contract used by the `geocode` RPC
/// method.
pub struct Geocoder {
    locator: RegionLocator,
    label_model: Box<dyn LabelModel>,
    backend: AddressBookBackend,
}

impl Geocoder {
    pub fn new(
        locator: RegionLocator,
        label_model: Box<dyn LabelModel>,
        backend: AddressBookBackend,
    ) -> Self {
        Geocoder {
            locator,
            label_model,
            backend,
        }
    }

    pub fn locator(&self) -> &RegionLocator {
        &self.locator
    }

    /// `lookup(user_location, query_text, overrides) -> lookup_result`:
    /// (a) locate the region containing `user_location`, failing with
    /// [`GeocoderError::UnsupportedLocation`] if none does; (b) decompose
    /// `query_text`; (c) apply `overrides`; (d) apply the practical-adjust
    /// heuristic; (e) dispatch to the backend for the located region.
    pub fn lookup(
        &self,
        user_location: Coordinates,
        query_text: &str,
        overrides: &AddressComponents,
    ) -> Result<(String, LookupResult), GeocoderError> {
        let region = self
            .locator
            .locate(user_location)
            .ok_or(GeocoderError::UnsupportedLocation)?;

        let decomposed = decomposer::decompose(self.label_model.as_ref(), query_text);
        let combined = decomposed.with_overrides(overrides);
        let adjusted = decomposer::practical_text_adjust(combined);

        let result = self.backend.lookup(region.name(), &adjusted)?;

        Ok((region.name().to_owned(), result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoder::backends::radix::RadixBackend;
    use crate::geocoder::decomposer::NullLabelModel;
    use crate::model::Building;
    use crate::spacial::Region;
    use geo_types::{coord, LineString, Polygon};

    fn region(name: &str) -> Region {
        let ring = LineString(vec![
            coord! { x: 20.0, y: 50.0 },
            coord! { x: 20.0, y: 55.0 },
            coord! { x: 26.0, y: 55.0 },
            coord! { x: 26.0, y: 50.0 },
            coord! { x: 20.0, y: 50.0 },
        ]);
        Region::new(name, Polygon::new(ring, vec![]))
    }

    fn geocoder_with_hints() -> Geocoder {
        let locator = RegionLocator::build(vec![region("podlaskie")]).unwrap();
        let mut radix = RadixBackend::new();
        radix
            .insert(
                "podlaskie",
                "Wiejska",
                "Bialystok",
                "1",
                Building::new(1, Coordinates::new(53.1, 23.1), "PL", "Bialystok", "15-318", "Wiejska", "1"),
            )
            .unwrap();
        radix
            .insert(
                "podlaskie",
                "Wiejska",
                "Suwalki",
                "2",
                Building::new(2, Coordinates::new(54.1, 22.9), "PL", "Suwalki", "16-400", "Wiejska", "2"),
            )
            .unwrap();
        Geocoder::new(
            locator,
            Box::new(NullLabelModel),
            backends::AddressBookBackend::Radix(radix),
        )
    }

    #[test]
    fn unsupported_location_fails_before_decomposing() {
        let geocoder = geocoder_with_hints();
        let err = geocoder
            .lookup(Coordinates::new(64.35, 28.66), "Wiejska", &AddressComponents::default())
            .unwrap_err();
        assert!(matches!(err, GeocoderError::UnsupportedLocation));
    }

    #[test]
    fn overrides_reach_the_backend_even_with_no_decomposed_text() {
        let geocoder = geocoder_with_hints();
        let overrides = AddressComponents {
            street: Some("Wiejska".into()),
            ..Default::default()
        };
        let (region, result) = geocoder
            .lookup(Coordinates::new(53.1, 23.1), "", &overrides)
            .unwrap();
        assert_eq!(region, "podlaskie");
        assert!(result.matches.is_empty());
        assert_eq!(result.hints.len(), 2);
    }
}
