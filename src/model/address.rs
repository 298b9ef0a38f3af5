//! Address-related data model shared by the geocoder and the routing layer.

use serde::{Deserialize, Serialize};

use crate::spacial::Coordinates;

/// An addressable building: a concrete, coordinate-bearing match returned by
/// the geocoder backend. The building number is uppercased before exposure
/// (some regions encode apartment/suite letters in the number, e.g. `35A`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: i64,
    pub coords: Coordinates,
    pub country: String,
    pub city: String,
    pub zipcode: String,
    pub street: String,
    pub number: String,
}

impl Building {
    /// Construct a building, normalizing `number` per the uppercasing
    /// invariant so callers never have to remember to do it themselves.
    pub fn new(
        id: i64,
        coords: Coordinates,
        country: impl Into<String>,
        city: impl Into<String>,
        zipcode: impl Into<String>,
        street: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        Building {
            id,
            coords,
            country: country.into(),
            city: city.into(),
            zipcode: zipcode.into(),
            street: street.into(),
            number: number.into().to_uppercase(),
        }
    }
}

/// Components of an address, any subset of which may be present. Used both
/// as the decomposer's output and as the caller-supplied override shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressComponents {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<String>,
}

impl AddressComponents {
    /// True if none of the four components are present.
    pub fn is_empty(&self) -> bool {
        self.city.is_none()
            && self.street.is_none()
            && self.building.is_none()
            && self.zipcode.is_none()
    }

    /// Apply `overrides` on top of `self`: any component present in
    /// `overrides` replaces the corresponding component here, regardless of
    /// what was already decomposed.
    pub fn with_overrides(mut self, overrides: &AddressComponents) -> Self {
        if overrides.city.is_some() {
            self.city = overrides.city.clone();
        }
        if overrides.street.is_some() {
            self.street = overrides.street.clone();
        }
        if overrides.building.is_some() {
            self.building = overrides.building.clone();
        }
        if overrides.zipcode.is_some() {
            self.zipcode = overrides.zipcode.clone();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn building_number_is_uppercased() {
        let b = Building::new(
            1,
            Coordinates::new(53.0, 23.0),
            "PL",
            "Bialystok",
            "15-318",
            "Wiejska",
            "35a",
        );
        assert_eq!(b.number, "35A");
    }

    #[test]
    fn overrides_replace_present_fields_only() {
        let base = AddressComponents {
            city: Some("Bialystok".into()),
            street: Some("Wiejska".into()),
            building: None,
            zipcode: None,
        };
        let overrides = AddressComponents {
            city: Some("Suwalki".into()),
            street: None,
            building: None,
            zipcode: None,
        };
        let result = base.with_overrides(&overrides);
        assert_eq!(result.city.as_deref(), Some("Suwalki"));
        assert_eq!(result.street.as_deref(), Some("Wiejska"));
    }
}
