//! FHIR `Bundle` wire model.
//!
//! A bundle is an ordered list of entries, each holding at most one resource. Entry order is
//! significant for document bundles and is never changed by this crate.

use crate::resource::Resource;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Purpose of a bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Document,
    Message,
    Transaction,
    TransactionResponse,
    Batch,
    BatchResponse,
    History,
    Searchset,
    Collection,
}

impl BundleType {
    /// The wire code, as written in `Bundle.type`.
    pub fn code(self) -> &'static str {
        match self {
            BundleType::Document => "document",
            BundleType::Message => "message",
            BundleType::Transaction => "transaction",
            BundleType::TransactionResponse => "transaction-response",
            BundleType::Batch => "batch",
            BundleType::BatchResponse => "batch-response",
            BundleType::History => "history",
            BundleType::Searchset => "searchset",
            BundleType::Collection => "collection",
        }
    }
}

/// A container for a collection of resources.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
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
    pub identifier: Option<Value>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<BundleType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,

    /// `signature` and any other members, carried verbatim.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Bundle {
    /// An empty bundle of the given type.
    pub fn new(bundle_type: BundleType) -> Self {
        Self {
            resource_type: "Bundle".into(),
            id: None,
            meta: None,
            implicit_rules: None,
            language: None,
            identifier: None,
            bundle_type: Some(bundle_type),
            timestamp: None,
            total: None,
            link: None,
            entry: Vec::new(),
            other: Map::new(),
        }
    }

    /// Append an entry holding `resource`.
    pub fn push(&mut self, resource: impl Into<Resource>) {
        self.entry.push(BundleEntry::with_resource(resource.into()));
    }

    /// Resources of all entries that hold one, in bundle order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.entry.iter().filter_map(|entry| entry.resource.as_ref())
    }

    /// Whether the bundle declares itself a document bundle.
    pub fn is_document(&self) -> bool {
        self.bundle_type == Some(BundleType::Document)
    }
}

/// One entry of a bundle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Value>,

    #[serde(rename = "fullUrl", default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,

    /// `search`, `request`, `response` and extensions, carried verbatim.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl BundleEntry {
    pub fn with_resource(resource: Resource) -> Self {
        Self {
            resource: Some(resource),
            ..Self::default()
        }
    }
}
