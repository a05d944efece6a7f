//! # Narrative Core
//!
//! Narrative generation and document assembly for FHIR bundles.
//!
//! This crate contains the bundle-level operations:
//! - rendering a narrative for every resource from resource-type templates
//! - resolving Composition section entries to bundle resources
//! - filling section text from referenced narratives and adding sections for orphans
//!
//! **No I/O concerns beyond templates**: reading input documents, choosing output formats and
//! mapping errors to exit codes belong in the `narrative-generator` binary.

pub mod config;
pub mod constants;
pub mod error;
pub mod populate;
pub mod references;
pub mod renderer;
pub mod repository;
pub mod sections;
pub mod template;

pub use config::{resolve_template_dir, CoreConfig};
pub use error::{NarrativeError, NarrativeResult};
pub use populate::{populate_narratives, PopulationReport, RenderFailure};
pub use references::{candidate_references, reference_matches, ResourceIndex};
pub use renderer::{NarrativeRenderer, RenderOutcome, TemplateNarrativeRenderer, XhtmlFragment};
pub use repository::TemplateRepository;
pub use sections::{
    assign_sections, find_composition, reconcile_sections, synthesize_orphan_sections,
    ReconcileReport, SectionReport,
};

use fhir::{Bundle, BundleType, Resource};

/// Summary of the section-text pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    pub population: PopulationReport,
    pub sections: SectionReport,
}

/// Unwrap a parsed document that must be a Bundle.
///
/// # Errors
///
/// Returns [`NarrativeError::NotABundle`] naming the resource type found instead.
pub fn into_bundle(resource: Resource) -> NarrativeResult<Bundle> {
    match resource {
        Resource::Bundle(bundle) => Ok(*bundle),
        other => Err(NarrativeError::NotABundle(other.resource_type().to_string())),
    }
}

/// Narrative pipelines over a renderer.
#[derive(Clone, Debug)]
pub struct NarrativeService<R = TemplateNarrativeRenderer> {
    renderer: R,
}

impl NarrativeService<TemplateNarrativeRenderer> {
    /// Creates a service rendering with the templates of `config`.
    ///
    /// # Errors
    /// Returns [`NarrativeError`] if the manifest or any template fails to load.
    pub fn from_config(config: &CoreConfig) -> NarrativeResult<Self> {
        let repository = TemplateRepository::from_config(config)?;
        Ok(Self::new(TemplateNarrativeRenderer::new(repository)))
    }
}

impl<R: NarrativeRenderer> NarrativeService<R> {
    pub fn new(renderer: R) -> Self {
        Self { renderer }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Populate the narrative of every bundle entry.
    pub fn bundle_with_narratives(&self, bundle: &mut Bundle) -> PopulationReport {
        warn_unless_document(bundle);
        populate_narratives(bundle, &self.renderer)
    }

    /// Populate entry narratives, then fill and extend the Composition sections.
    ///
    /// # Errors
    /// Returns [`NarrativeError::NoComposition`] if the bundle holds no Composition. Entry
    /// narratives have already been populated when this happens.
    pub fn bundle_with_section_text(
        &self,
        bundle: &mut Bundle,
    ) -> NarrativeResult<AssemblyReport> {
        let population = self.bundle_with_narratives(bundle);
        let sections = assign_sections(bundle)?;
        Ok(AssemblyReport {
            population,
            sections,
        })
    }

    /// Render the narrative of `resource` itself.
    ///
    /// When `resource` is a Bundle its entries are populated first, so a Bundle template can
    /// draw on entry narratives.
    ///
    /// # Errors
    /// Returns [`NarrativeError::NoNarrativeGenerated`] if no template applies or the result is
    /// empty, and [`NarrativeError::RenderFailed`] if rendering breaks.
    pub fn resource_narrative(&self, resource: &mut Resource) -> NarrativeResult<XhtmlFragment> {
        if let Resource::Bundle(bundle) = resource {
            populate_narratives(bundle, &self.renderer);
        }

        match self.renderer.render(resource) {
            RenderOutcome::Fragment(fragment) => Ok(fragment),
            RenderOutcome::Empty => Err(NarrativeError::NoNarrativeGenerated),
            RenderOutcome::Failed(reason) => Err(NarrativeError::RenderFailed {
                resource: resource.label(),
                reason,
            }),
        }
    }
}

fn warn_unless_document(bundle: &Bundle) {
    if !bundle.is_document() {
        tracing::warn!(bundle_type = bundle_type_label(bundle), "Bundle type is not document");
    }
}

fn bundle_type_label(bundle: &Bundle) -> &'static str {
    bundle.bundle_type.map_or("<none>", BundleType::code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir::{Composition, DomainResource};

    fn service() -> NarrativeService {
        let repository = TemplateRepository::from_sources([
            ("Patient", "<p>{{id}}</p>"),
            ("Bundle", "{{#each entry}}{{resource.text.div}}{{/each}}"),
        ])
        .expect("repository");
        NarrativeService::new(TemplateNarrativeRenderer::new(repository))
    }

    #[test]
    fn into_bundle_rejects_other_resources() {
        let err =
            into_bundle(DomainResource::new("Patient", "p1").into()).expect_err("not a bundle");
        assert!(matches!(err, NarrativeError::NotABundle(t) if t == "Patient"));
        assert!(into_bundle(Bundle::new(BundleType::Document).into()).is_ok());
    }

    #[test]
    fn non_document_warning_uses_wire_code() {
        assert_eq!(bundle_type_label(&Bundle::new(BundleType::Collection)), "collection");
        assert_eq!(bundle_type_label(&Bundle::new(BundleType::BatchResponse)), "batch-response");
        let mut untyped = Bundle::new(BundleType::Document);
        untyped.bundle_type = None;
        assert_eq!(bundle_type_label(&untyped), "<none>");
    }

    #[test]
    fn section_text_pipeline_requires_composition() {
        let mut bundle = Bundle::new(BundleType::Collection);
        bundle.push(DomainResource::new("Patient", "p1"));
        let err = service()
            .bundle_with_section_text(&mut bundle)
            .expect_err("no composition");
        assert!(matches!(err, NarrativeError::NoComposition));
        assert!(bundle.resources().next().and_then(Resource::narrative_div).is_some());
    }

    #[test]
    fn section_text_pipeline_reports_both_passes() {
        let mut bundle = Bundle::new(BundleType::Document);
        bundle.push(Composition::new("c1"));
        bundle.push(DomainResource::new("Patient", "p1"));
        let report = service()
            .bundle_with_section_text(&mut bundle)
            .expect("assemble");
        assert_eq!(report.population.generated, 1);
        assert_eq!(report.sections.synthesized, 1);
    }

    #[test]
    fn resource_narrative_renders_top_level_resource() {
        let mut patient: Resource = DomainResource::new("Patient", "p1").into();
        let fragment = service().resource_narrative(&mut patient).expect("narrative");
        assert!(fragment.as_str().contains("<p>p1</p>"));

        let mut observation: Resource = DomainResource::new("Observation", "o1").into();
        let err = service()
            .resource_narrative(&mut observation)
            .expect_err("no template");
        assert!(matches!(err, NarrativeError::NoNarrativeGenerated));
    }

    #[test]
    fn resource_narrative_populates_bundle_entries_first() {
        let mut bundle = Bundle::new(BundleType::Document);
        bundle.push(DomainResource::new("Patient", "p1"));
        let mut resource: Resource = bundle.into();
        let fragment = service().resource_narrative(&mut resource).expect("narrative");
        assert!(fragment.as_str().contains("&lt;p&gt;p1&lt;/p&gt;"));
    }
}
