//! Input sanitization applied before any address-book backend dispatch.
//!
//! Grounded in the original's locale-aware `sanitize()`: characters outside
//! `[alnum, space, '/', '-', '.']` are replaced with a space. This defeats
//! FTS query-language injection and is harmless for the in-memory backend.

use crate::model::AddressComponents;

/// Replace every character outside the allowed set with a space.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '/' || c == '-' || c == '.' {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Sanitize every populated field of a component set.
pub fn sanitize_components(components: &AddressComponents) -> AddressComponents {
    AddressComponents {
        city: components.city.as_deref().map(sanitize),
        street: components.street.as_deref().map(sanitize),
        building: components.building.as_deref().map(sanitize),
        zipcode: components.zipcode.as_deref().map(sanitize),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_disallowed_characters_with_spaces() {
        assert_eq!(sanitize("Wiejska*\"; DROP TABLE"), "Wiejska    DROP TABLE");
        assert_eq!(sanitize("35a/2-B."), "35a/2-B.");
    }
}
