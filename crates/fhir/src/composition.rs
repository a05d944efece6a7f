//! FHIR `Composition` wire model with its sections and entry references.
//!
//! Only the members narrative assembly touches are typed (`text`, `section.title`,
//! `section.text`, `section.entry`). Every other member is carried verbatim.
//!
//! Notes:
//! - Sections serialise in FHIR element order so that the XML codec emits valid documents.
//! - Nested sub-sections are carried verbatim and are not reconciled.

use crate::narrative::Narrative;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// A clinical document header: the Composition resource of a document bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,

    #[serde(
        rename = "implicitRules",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub implicit_rules: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Narrative>,

    #[serde(flatten)]
    pub other: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub section: Vec<Section>,
}

impl Composition {
    /// An empty Composition with the given id; mainly useful for building documents in code.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            resource_type: "Composition".into(),
            id: Some(id.into()),
            meta: None,
            implicit_rules: None,
            language: None,
            text: None,
            other: Map::new(),
            section: Vec::new(),
        }
    }
}

/// Element order of `Composition.section` in the FHIR R4 schema.
const SECTION_ELEMENT_ORDER: &[&str] = &[
    "id",
    "extension",
    "modifierExtension",
    "title",
    "code",
    "author",
    "focus",
    "text",
    "mode",
    "orderedBy",
    "entry",
    "emptyReason",
    "section",
];

/// One section of a Composition.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub text: Option<Narrative>,

    /// References to the resources this section summarises, in document order.
    #[serde(default)]
    pub entry: Vec<Reference>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Section {
    /// A section that already carries its narrative and a single entry reference.
    pub fn with_entry(title: impl Into<String>, text: Narrative, entry: Reference) -> Self {
        Self {
            title: Some(title.into()),
            text: Some(text),
            entry: vec![entry],
            other: Map::new(),
        }
    }

    /// Whether the section text holds markup.
    pub fn has_text(&self) -> bool {
        self.text.as_ref().is_some_and(Narrative::has_div)
    }

    /// Reference strings of the section entries; entries without one are skipped.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.entry.iter().filter_map(|entry| entry.reference.as_deref())
    }

    /// Title for log messages.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("<untitled>")
    }
}

impl Serialize for Section {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        for key in SECTION_ELEMENT_ORDER {
            match *key {
                "title" => {
                    if let Some(title) = &self.title {
                        map.serialize_entry("title", title)?;
                    }
                }
                "text" => {
                    if let Some(text) = &self.text {
                        map.serialize_entry("text", text)?;
                    }
                }
                "entry" => {
                    if !self.entry.is_empty() {
                        map.serialize_entry("entry", &self.entry)?;
                    }
                }
                other => {
                    if let Some(value) = self.other.get(other) {
                        map.serialize_entry(other, value)?;
                    }
                }
            }
        }
        for (key, value) in &self.other {
            if !SECTION_ELEMENT_ORDER.contains(&key.as_str()) {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

/// A FHIR `Reference` as used by `section.entry`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// `display`, `type`, `identifier` and extensions, carried verbatim.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Reference {
    /// A literal reference to `target`.
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            reference: Some(target.into()),
            other: Map::new(),
        }
    }
}
