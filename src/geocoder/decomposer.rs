//! Splits a free-text address into `{street, building, city, zipcode}`
//! components.
//!
//! The actual character-level named-entity recognizer is an external
//! collaborator (out of scope, §1) — only its input/output shape matters
//! here. [`LabelModel`] is the seam a real model plugs into; this crate
//! ships only a [`NullLabelModel`] for configurations and tests that rely
//! purely on caller-supplied overrides.

use crate::model::AddressComponents;

/// One character's classification, as produced by the (external) NER.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Label {
    City,
    Street,
    Building,
    Zipcode,
    Other,
}

/// External contract: label every character of `text`.
pub trait LabelModel: Send + Sync {
    /// Returns one [`Label`] per `char` of `text` (not per byte).
    fn label(&self, text: &str) -> Vec<Label>;
}

/// A label model that never recognizes anything. Useful where only the
/// override path is exercised (tests, or a deployment that hasn't wired up
/// a real NER yet).
#[derive(Default)]
pub struct NullLabelModel;

impl LabelModel for NullLabelModel {
    fn label(&self, text: &str) -> Vec<Label> {
        vec![Label::Other; text.chars().count()]
    }
}

/// Splits `text` into components using `model`'s per-character labels.
///
/// The span for label `L` is `text[first_L ..= last_L]` — the first and
/// last character positions labeled `L`, inclusive of anything mislabeled in
/// between (this is what lets a stray separator character sit inside a
/// street or city name without truncating it).
pub fn decompose(model: &dyn LabelModel, text: &str) -> AddressComponents {
    let labels = model.label(text);
    let chars: Vec<char> = text.chars().collect();
    debug_assert_eq!(labels.len(), chars.len());

    AddressComponents {
        city: extract_component(&labels, &chars, Label::City),
        street: extract_component(&labels, &chars, Label::Street),
        building: extract_component(&labels, &chars, Label::Building),
        zipcode: extract_component(&labels, &chars, Label::Zipcode),
    }
}

fn extract_component(labels: &[Label], chars: &[char], target: Label) -> Option<String> {
    let first = labels.iter().position(|&l| l == target)?;
    let last = labels.iter().rposition(|&l| l == target)?;
    Some(chars[first..=last].iter().collect())
}

/// "Practical text adjust": when only `city` is populated (no street,
/// building, or zipcode), reassign it to `street`. When a user starts typing
/// a single word, the decomposer prefers street candidates over city
/// candidates, so an apparent lone city is usually really a street name.
pub fn practical_text_adjust(mut components: AddressComponents) -> AddressComponents {
    let only_city = components.city.is_some()
        && components.street.is_none()
        && components.building.is_none()
        && components.zipcode.is_none();
    if only_city {
        components.street = components.city.take();
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLabelModel(Vec<Label>);
    impl LabelModel for FixedLabelModel {
        fn label(&self, _text: &str) -> Vec<Label> {
            self.0.clone()
        }
    }

    #[test]
    fn decomposes_mixed_text_per_reference_labels() {
        // "Wiejska 35a bialystok 15-318"
        let text = "Wiejska 35a bialystok 15-318";
        let mut labels = Vec::new();
        labels.extend(std::iter::repeat(Label::Street).take(7)); // Wiejska
        labels.push(Label::Other); // space
        labels.extend(std::iter::repeat(Label::Building).take(3)); // 35a
        labels.push(Label::Other); // space
        labels.extend(std::iter::repeat(Label::City).take(9)); // bialystok
        labels.push(Label::Other); // space
        labels.extend(std::iter::repeat(Label::Zipcode).take(6)); // 15-318
        assert_eq!(labels.len(), text.chars().count());

        let model = FixedLabelModel(labels);
        let components = decompose(&model, text);
        assert_eq!(components.street.as_deref(), Some("Wiejska"));
        assert_eq!(components.building.as_deref(), Some("35a"));
        assert_eq!(components.city.as_deref(), Some("bialystok"));
        assert_eq!(components.zipcode.as_deref(), Some("15-318"));
    }

    #[test]
    fn practical_adjust_moves_lone_city_to_street() {
        let components = AddressComponents {
            city: Some("wiejska".into()),
            street: None,
            building: None,
            zipcode: None,
        };
        let adjusted = practical_text_adjust(components);
        assert_eq!(adjusted.street.as_deref(), Some("wiejska"));
        assert!(adjusted.city.is_none());
    }

    #[test]
    fn practical_adjust_is_identity_otherwise() {
        let components = AddressComponents {
            city: Some("bialystok".into()),
            street: Some("Wiejska".into()),
            building: None,
            zipcode: None,
        };
        let adjusted = practical_text_adjust(components.clone());
        assert_eq!(adjusted, components);
    }

    #[test]
    fn span_includes_extreme_positions_even_with_interior_noise() {
        // "AxxB" where only the first and last chars are labeled Street,
        // the middle two are Other — span must still be the whole string.
        let model = FixedLabelModel(vec![Label::Street, Label::Other, Label::Other, Label::Street]);
        let components = decompose(&model, "AxxB");
        assert_eq!(components.street.as_deref(), Some("AxxB"));
    }
}
