//! Narrative rendering.
//!
//! The renderer turns one resource into an XHTML fragment. It never aborts the bundle pass:
//! an unsupported resource type is [`RenderOutcome::Empty`] and a broken render is reported
//! as [`RenderOutcome::Failed`] for the caller to log and skip.

use crate::repository::TemplateRepository;
use fhir::{wrap_xhtml, Resource};
use std::fmt;

/// Non-blank XHTML markup produced by a renderer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XhtmlFragment(String);

impl XhtmlFragment {
    /// Wrap `markup`, or `None` when it is blank.
    pub fn new(markup: impl Into<String>) -> Option<Self> {
        let markup = markup.into();
        if markup.trim().is_empty() {
            None
        } else {
            Some(Self(markup))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for XhtmlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of rendering a single resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    Fragment(XhtmlFragment),
    /// No template for the resource type, or the template produced nothing.
    Empty,
    /// Rendering broke; the reason is logged by the caller.
    Failed(String),
}

/// Produces narrative markup for a resource.
pub trait NarrativeRenderer {
    fn render(&self, resource: &Resource) -> RenderOutcome;
}

/// Renderer backed by the templates of a [`TemplateRepository`].
///
/// Each template renders against the resource's JSON form and its output is wrapped in an
/// XHTML-namespaced `div`.
#[derive(Clone, Debug)]
pub struct TemplateNarrativeRenderer {
    repository: TemplateRepository,
}

impl TemplateNarrativeRenderer {
    pub fn new(repository: TemplateRepository) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &TemplateRepository {
        &self.repository
    }
}

impl NarrativeRenderer for TemplateNarrativeRenderer {
    fn render(&self, resource: &Resource) -> RenderOutcome {
        let Some(template) = self.repository.get(resource.resource_type()) else {
            return RenderOutcome::Empty;
        };

        let context = match resource.to_value() {
            Ok(value) => value,
            Err(err) => return RenderOutcome::Failed(err.to_string()),
        };

        match template.render(&context) {
            Ok(markup) if markup.trim().is_empty() => RenderOutcome::Empty,
            Ok(markup) => XhtmlFragment::new(wrap_xhtml(markup.trim()))
                .map_or(RenderOutcome::Empty, RenderOutcome::Fragment),
            Err(err) => RenderOutcome::Failed(format!("{}: {err}", template.name())),
        }
    }
}
