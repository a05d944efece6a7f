//! Reference resolution between Composition sections and bundle entries.
//!
//! A section entry reference `R` points at a resource of type `T` with id `I` exactly when
//! `R` is one of `I`, `urn:uuid:I` or `T/I`. No other form (absolute URLs, `fullUrl`,
//! identifiers) is considered. A resource without an id cannot be referenced.

use crate::constants::URN_UUID_PREFIX;
use fhir::{Bundle, Resource};
use std::collections::HashMap;

/// The three reference strings that identify a resource: `id`, `urn:uuid:id`, `Type/id`.
pub fn candidate_references(resource_type: &str, id: &str) -> [String; 3] {
    [
        id.to_string(),
        format!("{URN_UUID_PREFIX}{id}"),
        format!("{resource_type}/{id}"),
    ]
}

/// Whether `reference` identifies `resource`.
pub fn reference_matches(reference: &str, resource: &Resource) -> bool {
    let Some(id) = resource.id() else {
        return false;
    };
    reference == id
        || reference.strip_prefix(URN_UUID_PREFIX) == Some(id)
        || reference
            .strip_prefix(resource.resource_type())
            .and_then(|rest| rest.strip_prefix('/'))
            == Some(id)
}

/// Lookup from reference string to the positions of the narratable entries it identifies.
///
/// Positions index `Bundle::entry` and are kept in bundle order. When several resources share
/// a type and id, every one of them is listed.
#[derive(Clone, Debug, Default)]
pub struct ResourceIndex {
    by_reference: HashMap<String, Vec<usize>>,
}

impl ResourceIndex {
    pub fn build(bundle: &Bundle) -> Self {
        let mut by_reference: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, entry) in bundle.entry.iter().enumerate() {
            let Some(resource) = entry.resource.as_ref().filter(|r| r.is_narratable()) else {
                continue;
            };
            let Some(id) = resource.id() else {
                continue;
            };
            for candidate in candidate_references(resource.resource_type(), id) {
                by_reference.entry(candidate).or_default().push(position);
            }
        }
        Self { by_reference }
    }

    /// Entry positions identified by `reference`, in bundle order.
    pub fn lookup(&self, reference: &str) -> &[usize] {
        self.by_reference
            .get(reference)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir::{BundleType, DomainResource, PlainResource};

    fn observation() -> Resource {
        DomainResource::new("Observation", "123").into()
    }

    #[test]
    fn builds_the_three_forms() {
        assert_eq!(
            candidate_references("Observation", "123"),
            [
                "123".to_string(),
                "urn:uuid:123".to_string(),
                "Observation/123".to_string()
            ]
        );
    }

    #[test]
    fn matches_every_form_and_nothing_else() {
        let obs = observation();
        for reference in ["123", "urn:uuid:123", "Observation/123"] {
            assert!(reference_matches(reference, &obs), "{reference}");
        }
        for reference in [
            "Patient/123",
            "Observation/1234",
            "urn:uuid:12",
            "http://example.org/fhir/Observation/123",
            "Observation123",
            "",
        ] {
            assert!(!reference_matches(reference, &obs), "{reference}");
        }
    }

    #[test]
    fn resources_without_id_match_nothing() {
        let mut obs = DomainResource::new("Observation", "x");
        obs.id = None;
        let obs: Resource = obs.into();
        assert!(!reference_matches("", &obs));
        assert!(!reference_matches("Observation/", &obs));
    }

    #[test]
    fn index_agrees_with_reference_matches() {
        let mut bundle = Bundle::new(BundleType::Document);
        bundle.push(DomainResource::new("Patient", "p1"));
        bundle.push(observation());
        bundle.push(Resource::Plain(PlainResource {
            resource_type: "Binary".into(),
            id: Some("123".into()),
            other: Default::default(),
        }));
        bundle.push(DomainResource::new("Observation", "123"));
        let index = ResourceIndex::build(&bundle);

        for reference in ["123", "urn:uuid:123", "Observation/123"] {
            assert_eq!(index.lookup(reference), &[1, 3], "{reference}");
        }
        assert_eq!(index.lookup("Patient/p1"), &[0]);
        assert!(index.lookup("Binary/123").is_empty());
        assert!(index.lookup("Patient/p2").is_empty());

        for reference in ["p1", "urn:uuid:p1", "Patient/p1", "Observation/123", "nope"] {
            let expected: Vec<usize> = bundle
                .entry
                .iter()
                .enumerate()
                .filter(|(_, entry)| {
                    entry.resource.as_ref().is_some_and(|resource| {
                        resource.is_narratable() && reference_matches(reference, resource)
                    })
                })
                .map(|(position, _)| position)
                .collect();
            assert_eq!(index.lookup(reference), expected.as_slice(), "{reference}");
        }
    }
}
