//! Per-resource narrative population.

use crate::renderer::{NarrativeRenderer, RenderOutcome};
use fhir::{Bundle, Narrative};

/// A resource whose narrative could not be rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderFailure {
    /// `Type/id` of the resource.
    pub resource: String,
    pub reason: String,
}

/// Summary of one population pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PopulationReport {
    /// Narratives written.
    pub generated: usize,
    /// Resources for which the renderer had nothing to say.
    pub empty: usize,
    /// Fragments produced for resources without a narrative slot.
    pub unsupported: usize,
    pub failures: Vec<RenderFailure>,
}

/// Render a narrative for every resource in `bundle`, in entry order.
///
/// A fragment replaces the narrative of a narratable resource with a `generated` one. Empty
/// results leave the resource alone; failures are logged and recorded, and the pass carries
/// on with the next entry.
pub fn populate_narratives(
    bundle: &mut Bundle,
    renderer: &dyn NarrativeRenderer,
) -> PopulationReport {
    let mut report = PopulationReport::default();

    for resource in bundle.entry.iter_mut().filter_map(|entry| entry.resource.as_mut()) {
        match renderer.render(resource) {
            RenderOutcome::Fragment(fragment) => {
                let label = resource.label();
                match resource.narrative_slot_mut() {
                    Some(slot) => {
                        slot.get_or_insert_with(Narrative::default)
                            .set_generated(fragment.into_string());
                        tracing::debug!(resource = %label, "generated narrative");
                        report.generated += 1;
                    }
                    None => {
                        tracing::debug!(
                            resource = %label,
                            "resource has no narrative slot; fragment ignored"
                        );
                        report.unsupported += 1;
                    }
                }
            }
            RenderOutcome::Empty => report.empty += 1,
            RenderOutcome::Failed(reason) => {
                let label = resource.label();
                tracing::warn!(resource = %label, %reason, "narrative generation failed");
                report.failures.push(RenderFailure {
                    resource: label,
                    reason,
                });
            }
        }
    }

    report
}
