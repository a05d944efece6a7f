//! FHIR JSON.

use crate::resource::Resource;
use crate::FhirResult;
use serde_json::Value;

/// Parse a resource from FHIR JSON.
pub fn from_json(text: &str) -> FhirResult<Resource> {
    let value: Value = serde_json::from_str(text)?;
    Resource::from_value(value)
}

/// Serialise a resource as FHIR JSON.
pub fn to_json(resource: &Resource, pretty: bool) -> FhirResult<String> {
    let text = if pretty {
        serde_json::to_string_pretty(resource)?
    } else {
        serde_json::to_string(resource)?
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FhirError;

    #[test]
    fn rejects_malformed_json() {
        let err = from_json("{\"resourceType\": ").expect_err("should reject");
        assert!(matches!(err, FhirError::InvalidJson(_)));
    }

    #[test]
    fn compact_output_has_no_newlines() {
        let resource = from_json(
            r#"{
                "resourceType": "Patient",
                "id": "p1",
                "text": { "status": "generated", "div": "<div xmlns=\"http://www.w3.org/1999/xhtml\">Max</div>" }
            }"#,
        )
        .expect("parse patient");

        let compact = to_json(&resource, false).expect("serialise");
        assert!(!compact.contains('\n'));
        assert!(compact.starts_with("{\"resourceType\":\"Patient\",\"id\":\"p1\""));

        let pretty = to_json(&resource, true).expect("serialise");
        assert!(pretty.contains("\n  \"id\": \"p1\""));
    }
}
