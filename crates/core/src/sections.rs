//! Composition section assignment.
//!
//! Two passes over the first Composition of a document bundle:
//!
//! 1. [`reconcile_sections`] fills the text of existing sections from the narratives of the
//!    resources their entries reference. Authored section text is never touched.
//! 2. [`synthesize_orphan_sections`] appends one section per narrated resource that no
//!    existing section references.
//!
//! Each pass first reads the bundle to plan its changes and then applies them to the
//! Composition, so resource narratives are never borrowed while the Composition is mutated.

use crate::constants::SECTION_SEPARATOR;
use crate::references::{candidate_references, ResourceIndex};
use crate::{NarrativeError, NarrativeResult};
use fhir::{wrap_xhtml, Bundle, Composition, Narrative, Reference, Resource, Section};
use std::collections::HashSet;

/// Outcome of [`reconcile_sections`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Sections whose text was generated.
    pub filled: usize,
    /// Sections skipped because they already carry text.
    pub authored: usize,
    /// Sections skipped because they have no entries.
    pub without_entries: usize,
    /// Sections left without text because none of their entries had a narrative.
    pub without_narrative: usize,
    /// References that identify no narratable resource in the bundle.
    pub unresolved: Vec<String>,
}

/// Outcome of [`assign_sections`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionReport {
    /// Position of the Composition in `Bundle::entry`.
    pub composition_position: usize,
    pub reconciled: ReconcileReport,
    /// Sections appended for unreferenced resources.
    pub synthesized: usize,
}

/// Position of the first Composition in bundle order.
pub fn find_composition(bundle: &Bundle) -> Option<usize> {
    bundle
        .entry
        .iter()
        .position(|entry| entry.resource.as_ref().is_some_and(Resource::is_composition))
}

/// Reconcile the Composition sections and then synthesise sections for orphan resources.
///
/// # Errors
///
/// Returns [`NarrativeError::NoComposition`] if the bundle holds no Composition.
pub fn assign_sections(bundle: &mut Bundle) -> NarrativeResult<SectionReport> {
    let composition_position = find_composition(bundle).ok_or(NarrativeError::NoComposition)?;
    let reconciled = reconcile_sections(bundle, composition_position);
    let synthesized = synthesize_orphan_sections(bundle, composition_position);

    Ok(SectionReport {
        composition_position,
        reconciled,
        synthesized,
    })
}

fn composition_at(bundle: &Bundle, position: usize) -> Option<&Composition> {
    bundle
        .entry
        .get(position)
        .and_then(|entry| entry.resource.as_ref())
        .and_then(Resource::as_composition)
}

fn composition_at_mut(bundle: &mut Bundle, position: usize) -> Option<&mut Composition> {
    bundle
        .entry
        .get_mut(position)
        .and_then(|entry| entry.resource.as_mut())
        .and_then(Resource::as_composition_mut)
}

/// Fill the text of sections that have entries but no text of their own.
///
/// For each such section, every resource identified by each entry reference contributes its
/// narrative `div`, in reference order and then bundle order, separated by `<hr/>`. The
/// result is wrapped in one XHTML `div` and stored with status `generated`. A section whose
/// references yield no narrative keeps no text.
pub fn reconcile_sections(bundle: &mut Bundle, composition_position: usize) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let Some(composition) = composition_at(bundle, composition_position) else {
        tracing::warn!(position = composition_position, "no Composition at entry position");
        return report;
    };

    let index = ResourceIndex::build(bundle);
    let mut updates: Vec<(usize, String)> = Vec::new();

    for (section_position, section) in composition.section.iter().enumerate() {
        if section.has_text() {
            report.authored += 1;
            continue;
        }
        if section.entry.is_empty() {
            report.without_entries += 1;
            continue;
        }

        let mut buffer = String::new();
        for entry in &section.entry {
            let Some(reference) = entry.reference.as_deref() else {
                tracing::debug!(section = section.display_title(), "entry without reference");
                continue;
            };

            let positions = index.lookup(reference);
            if positions.is_empty() {
                tracing::warn!(
                    section = section.display_title(),
                    reference,
                    "section entry does not resolve to a resource in the bundle"
                );
                report.unresolved.push(reference.to_string());
                continue;
            }

            let divs = positions.iter().filter_map(|&position| {
                bundle
                    .entry
                    .get(position)
                    .and_then(|entry| entry.resource.as_ref())
                    .and_then(Resource::narrative_div)
            });
            for div in divs {
                if !buffer.is_empty() {
                    buffer.push_str(SECTION_SEPARATOR);
                }
                buffer.push_str(div);
            }
        }

        if buffer.is_empty() {
            report.without_narrative += 1;
        } else {
            updates.push((section_position, wrap_xhtml(&buffer)));
        }
    }

    if let Some(composition) = composition_at_mut(bundle, composition_position) {
        for (section_position, div) in updates {
            if let Some(section) = composition.section.get_mut(section_position) {
                tracing::debug!(section = section.display_title(), "generated section text");
                section
                    .text
                    .get_or_insert_with(Narrative::default)
                    .set_generated(div);
                report.filled += 1;
            }
        }
    }

    report
}

/// Append a section for every narrated resource that no existing section references.
///
/// The set of referenced strings is taken from the sections present when this runs, so call
/// it after [`reconcile_sections`]. Sections are titled with the resource type, carry a copy
/// of the resource narrative and reference the resource as `Type/id`. Compositions are never
/// added as sections of themselves. Returns the number of sections appended.
pub fn synthesize_orphan_sections(bundle: &mut Bundle, composition_position: usize) -> usize {
    let Some(composition) = composition_at(bundle, composition_position) else {
        tracing::warn!(position = composition_position, "no Composition at entry position");
        return 0;
    };

    let referenced: HashSet<&str> = composition
        .section
        .iter()
        .flat_map(Section::references)
        .collect();

    let mut additions = Vec::new();
    for resource in bundle.resources() {
        if resource.is_composition() {
            continue;
        }
        let Some(div) = resource.narrative_div() else {
            continue;
        };
        let Some(id) = resource.id() else {
            tracing::warn!(
                resource_type = resource.resource_type(),
                "narrated resource has no id and cannot be referenced from a section"
            );
            continue;
        };

        let [id_form, urn_form, typed_form] = candidate_references(resource.resource_type(), id);
        if [&id_form, &urn_form, &typed_form]
            .into_iter()
            .any(|candidate| referenced.contains(candidate.as_str()))
        {
            continue;
        }

        additions.push(Section::with_entry(
            resource.resource_type(),
            Narrative::generated(div),
            Reference::to(typed_form),
        ));
    }

    let added = additions.len();
    if let Some(composition) = composition_at_mut(bundle, composition_position) {
        for section in additions {
            tracing::debug!(section = section.display_title(), "added section");
            composition.section.push(section);
        }
    }
    added
}
