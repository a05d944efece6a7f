//! Document codec: FHIR JSON and FHIR XML.
//!
//! The input format is sniffed, not declared: leading whitespace is skipped and a `{` selects
//! JSON; anything else is handed to the XML reader.

mod json;
mod xml;

use crate::resource::Resource;
use crate::FhirResult;

pub use json::{from_json, to_json};
pub use xml::{from_xml, to_xml};

/// Serialisation formats understood by the codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Xml,
}

impl DocumentFormat {
    /// Detect the format of `text` from its first non-whitespace character.
    pub fn detect(text: &str) -> Self {
        match text.trim_start().chars().next() {
            Some('{') => DocumentFormat::Json,
            _ => DocumentFormat::Xml,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DocumentFormat::Json => "json",
            DocumentFormat::Xml => "xml",
        }
    }
}

/// Parse a FHIR document, detecting its format.
///
/// # Errors
///
/// Returns [`crate::FhirError`] if the text is not well-formed in the detected format or does
/// not describe a resource.
pub fn parse_document(text: &str) -> FhirResult<(Resource, DocumentFormat)> {
    let format = DocumentFormat::detect(text);
    let resource = parse_as(text, format)?;
    Ok((resource, format))
}

/// Parse a FHIR document in a known format.
pub fn parse_as(text: &str, format: DocumentFormat) -> FhirResult<Resource> {
    match format {
        DocumentFormat::Json => from_json(text),
        DocumentFormat::Xml => from_xml(text),
    }
}

/// Serialise a resource in the given format.
pub fn serialize(resource: &Resource, format: DocumentFormat, pretty: bool) -> FhirResult<String> {
    match format {
        DocumentFormat::Json => to_json(resource, pretty),
        DocumentFormat::Xml => to_xml(resource, pretty),
    }
}
