//! Template repository.
//!
//! A template directory holds `manifest.yaml` mapping resource type names to template files:
//!
//! ```yaml
//! templates:
//!   Patient: patient.html
//!   Observation: observation.html
//! ```
//!
//! Every template is read and parsed once, when the repository is loaded. A broken manifest
//! or template is a startup error rather than a per-resource render failure.

use crate::config::CoreConfig;
use crate::template::Template;
use crate::{NarrativeError, NarrativeResult};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    templates: BTreeMap<String, String>,
}

/// Parsed templates keyed by resource type.
#[derive(Clone, Debug, Default)]
pub struct TemplateRepository {
    templates: HashMap<String, Template>,
}

impl TemplateRepository {
    /// Load the repository from the template directory of `config`.
    pub fn from_config(config: &CoreConfig) -> NarrativeResult<Self> {
        Self::load(config.template_dir())
    }

    /// Load `manifest.yaml` from `dir` and parse every template it names.
    ///
    /// # Errors
    ///
    /// Returns [`NarrativeError`] if:
    /// - the manifest cannot be read ([`NarrativeError::ManifestRead`]),
    /// - the manifest is not a mapping with a `templates` table of strings, or has unknown
    ///   keys ([`NarrativeError::ManifestParse`]),
    /// - a template file cannot be read or has a syntax error.
    pub fn load(dir: &Path) -> NarrativeResult<Self> {
        let manifest_path = dir.join(crate::constants::TEMPLATE_MANIFEST_FILENAME);
        let manifest_text =
            fs::read_to_string(&manifest_path).map_err(|source| NarrativeError::ManifestRead {
                path: manifest_path.clone(),
                source,
            })?;
        let manifest = parse_manifest(&manifest_text)?;

        let mut templates = HashMap::with_capacity(manifest.templates.len());
        for (resource_type, file) in manifest.templates {
            let path = dir.join(&file);
            let source = fs::read_to_string(&path)
                .map_err(|source| NarrativeError::TemplateRead { path, source })?;
            let template = Template::parse(file, &source)?;
            templates.insert(resource_type, template);
        }

        tracing::debug!(
            dir = %dir.display(),
            count = templates.len(),
            "loaded narrative templates"
        );
        Ok(Self { templates })
    }

    /// Build a repository from in-memory `(resource type, template source)` pairs.
    pub fn from_sources<'a, I>(sources: I) -> NarrativeResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let templates = sources
            .into_iter()
            .map(|(resource_type, source)| {
                Template::parse(resource_type, source)
                    .map(|template| (resource_type.to_string(), template))
            })
            .collect::<NarrativeResult<HashMap<_, _>>>()?;
        Ok(Self { templates })
    }

    /// The template for `resource_type`, if one is registered.
    pub fn get(&self, resource_type: &str) -> Option<&Template> {
        self.templates.get(resource_type)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn parse_manifest(text: &str) -> NarrativeResult<Manifest> {
    let deserializer = serde_yaml::Deserializer::from_str(text);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() || path == "." {
            "<root>"
        } else {
            path.as_str()
        };
        NarrativeError::ManifestParse(format!("schema mismatch at {path}: {source}"))
    })
}
