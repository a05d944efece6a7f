//! Polymorphic FHIR resources.
//!
//! Resources are modelled as a tagged union over the handful of shapes narrative generation
//! cares about. Whether a resource can carry a narrative is a capability of the variant
//! (`Resource::narrative`), not a property derived from its type name at each call site.
//!
//! Notes:
//! - In R4 every resource except `Bundle`, `Binary` and `Parameters` is a DomainResource and
//!   therefore narratable.
//! - Members that are not modelled are kept in `other` and serialised back unchanged.

use crate::bundle::Bundle;
use crate::composition::Composition;
use crate::narrative::Narrative;
use crate::{FhirError, FhirResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Resource types that are not DomainResources and so have no `text` element.
const NON_DOMAIN_RESOURCE_TYPES: &[&str] = &["Binary", "Parameters"];

/// Any resource held by a bundle entry (or parsed as a top-level document).
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    /// A nested or top-level Bundle. Not narratable.
    Bundle(Box<Bundle>),
    /// The document header. Narratable and owns sections.
    Composition(Box<Composition>),
    /// Any other narratable resource (Patient, Observation, Encounter, ...).
    Domain(DomainResource),
    /// A resource type without a narrative slot (Binary, Parameters).
    Plain(PlainResource),
}

/// A narratable resource whose contents are otherwise carried verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainResource {
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
}

impl DomainResource {
    /// A bare resource of `resource_type` with the given id.
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: Some(id.into()),
            meta: None,
            implicit_rules: None,
            language: None,
            text: None,
            other: Map::new(),
        }
    }
}

/// A resource without a narrative slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlainResource {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Resource {
    /// Build a resource from a JSON value, dispatching on `resourceType`.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - the value is not an object or lacks a string `resourceType`,
    /// - a modelled member has an unexpected shape (the error names the failing path).
    pub fn from_value(value: Value) -> FhirResult<Self> {
        let resource_type = value
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or_else(|| FhirError::InvalidInput("missing resourceType".into()))?
            .to_string();

        let resource = match resource_type.as_str() {
            "Bundle" => Resource::Bundle(Box::new(typed(&resource_type, value)?)),
            "Composition" => Resource::Composition(Box::new(typed(&resource_type, value)?)),
            t if NON_DOMAIN_RESOURCE_TYPES.contains(&t) => {
                Resource::Plain(typed(&resource_type, value)?)
            }
            _ => Resource::Domain(typed(&resource_type, value)?),
        };
        Ok(resource)
    }

    /// Convert into a JSON value.
    pub fn to_value(&self) -> FhirResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// The `resourceType` name.
    pub fn resource_type(&self) -> &str {
        match self {
            Resource::Bundle(b) => &b.resource_type,
            Resource::Composition(c) => &c.resource_type,
            Resource::Domain(d) => &d.resource_type,
            Resource::Plain(p) => &p.resource_type,
        }
    }

    /// The logical id, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Resource::Bundle(b) => b.id.as_deref(),
            Resource::Composition(c) => c.id.as_deref(),
            Resource::Domain(d) => d.id.as_deref(),
            Resource::Plain(p) => p.id.as_deref(),
        }
    }

    /// `Type/id` for log messages.
    pub fn label(&self) -> String {
        format!("{}/{}", self.resource_type(), self.id().unwrap_or("<no id>"))
    }

    /// Whether the variant has a narrative slot.
    pub fn is_narratable(&self) -> bool {
        matches!(self, Resource::Composition(_) | Resource::Domain(_))
    }

    /// Whether this is a Composition.
    pub fn is_composition(&self) -> bool {
        matches!(self, Resource::Composition(_))
    }

    /// The narrative, when the variant is narratable and one is present.
    pub fn narrative(&self) -> Option<&Narrative> {
        match self {
            Resource::Composition(c) => c.text.as_ref(),
            Resource::Domain(d) => d.text.as_ref(),
            Resource::Bundle(_) | Resource::Plain(_) => None,
        }
    }

    /// The narrative slot itself; `None` when the variant is not narratable.
    pub fn narrative_slot_mut(&mut self) -> Option<&mut Option<Narrative>> {
        match self {
            Resource::Composition(c) => Some(&mut c.text),
            Resource::Domain(d) => Some(&mut d.text),
            Resource::Bundle(_) | Resource::Plain(_) => None,
        }
    }

    /// The populated narrative markup, if any.
    pub fn narrative_div(&self) -> Option<&str> {
        self.narrative()
            .filter(|narrative| narrative.has_div())
            .map(|narrative| narrative.div.as_str())
    }

    pub fn as_bundle(&self) -> Option<&Bundle> {
        match self {
            Resource::Bundle(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_composition(&self) -> Option<&Composition> {
        match self {
            Resource::Composition(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_composition_mut(&mut self) -> Option<&mut Composition> {
        match self {
            Resource::Composition(c) => Some(c),
            _ => None,
        }
    }
}

fn typed<T: DeserializeOwned>(resource_type: &str, value: Value) -> FhirResult<T> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() || path == "." {
            "<root>"
        } else {
            path.as_str()
        };
        FhirError::Translation(format!("{resource_type} schema mismatch at {path}: {source}"))
    })
}

impl From<DomainResource> for Resource {
    fn from(resource: DomainResource) -> Self {
        Resource::Domain(resource)
    }
}

impl From<Composition> for Resource {
    fn from(composition: Composition) -> Self {
        Resource::Composition(Box::new(composition))
    }
}

impl From<Bundle> for Resource {
    fn from(bundle: Bundle) -> Self {
        Resource::Bundle(Box::new(bundle))
    }
}

impl Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Resource::Bundle(b) => b.serialize(serializer),
            Resource::Composition(c) => c.serialize(serializer),
            Resource::Domain(d) => d.serialize(serializer),
            Resource::Plain(p) => p.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Resource::from_value(value).map_err(serde::de::Error::custom)
    }
}
