//! FHIR R4 wire/boundary support for narrative generation.
//!
//! This crate provides **wire models** and **format helpers** for FHIR document bundles:
//! - typed views over the parts of a Bundle that narrative generation reads and writes
//!   (entries, resources, narratives, the Composition and its sections)
//! - a document codec for FHIR JSON and FHIR XML, with format sniffing
//!
//! Everything else in a resource is carried verbatim so that a parsed bundle serialises
//! back without loss. This crate does not validate resources against FHIR profiles.

pub mod bundle;
pub mod codec;
pub mod composition;
pub mod narrative;
pub mod resource;

// Re-export public wire types
pub use bundle::{Bundle, BundleEntry, BundleType};
pub use codec::{parse_document, serialize, DocumentFormat};
pub use composition::{Composition, Reference, Section};
pub use narrative::{wrap_xhtml, Narrative, NarrativeStatus, XHTML_NAMESPACE};
pub use resource::{DomainResource, PlainResource, Resource};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid XML: {0}")]
    InvalidXml(String),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
