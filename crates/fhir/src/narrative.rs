//! FHIR `Narrative` wire model.
//!
//! A narrative is the human-readable XHTML summary attached to a resource (`text`) or to a
//! Composition section. The `div` is kept as an opaque markup string; this crate does not
//! parse or sanitise XHTML.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Namespace every narrative `div` must declare.
pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Narrative status codes (FHIR value set `narrative-status`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeStatus {
    /// Generated entirely from structured data.
    Generated,
    /// Generated from structured data and extensions.
    Extensions,
    /// Contains content beyond the structured data.
    Additional,
    /// No narrative content.
    Empty,
}

/// Human-readable XHTML summary of a resource or section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    /// Element id and extensions, carried verbatim.
    #[serde(flatten)]
    pub other: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NarrativeStatus>,

    /// XHTML markup, including the enclosing `<div>`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub div: String,
}

impl Narrative {
    /// A fresh narrative with status `generated`.
    pub fn generated(div: impl Into<String>) -> Self {
        Self {
            other: Map::new(),
            status: Some(NarrativeStatus::Generated),
            div: div.into(),
        }
    }

    /// Whether the `div` holds any markup.
    pub fn has_div(&self) -> bool {
        !self.div.trim().is_empty()
    }

    /// Replace the markup and mark the narrative as generated, keeping any extensions.
    pub fn set_generated(&mut self, div: impl Into<String>) {
        self.status = Some(NarrativeStatus::Generated);
        self.div = div.into();
    }
}

/// Wrap markup in a single XHTML-namespaced `div`.
pub fn wrap_xhtml(inner: &str) -> String {
    format!("<div xmlns=\"{XHTML_NAMESPACE}\">{inner}</div>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_extensions_when_regenerated() {
        let mut narrative: Narrative = serde_json::from_value(json!({
            "extension": [{ "url": "http://example.org/ext", "valueString": "x" }],
            "status": "additional",
            "div": "<div xmlns=\"http://www.w3.org/1999/xhtml\">old</div>"
        }))
        .expect("parse narrative");

        narrative.set_generated("<div xmlns=\"http://www.w3.org/1999/xhtml\">new</div>");

        let value = serde_json::to_value(&narrative).expect("serialise narrative");
        assert_eq!(value["status"], "generated");
        assert_eq!(value["extension"][0]["valueString"], "x");
        assert!(value["div"].as_str().unwrap_or_default().contains("new"));
    }

    #[test]
    fn blank_div_is_not_populated() {
        let narrative = Narrative {
            div: "   ".into(),
            ..Narrative::default()
        };
        assert!(!narrative.has_div());
        assert!(Narrative::generated("<div/>").has_div());
    }

    #[test]
    fn missing_status_is_not_invented() {
        let narrative: Narrative =
            serde_json::from_value(json!({ "div": "<div/>" })).expect("parse narrative");
        assert_eq!(narrative.status, None);
        let value = serde_json::to_value(&narrative).expect("serialise narrative");
        assert!(value.get("status").is_none());
    }

    #[test]
    fn wraps_in_xhtml_div() {
        assert_eq!(
            wrap_xhtml("<p>a</p>"),
            "<div xmlns=\"http://www.w3.org/1999/xhtml\"><p>a</p></div>"
        );
    }
}
