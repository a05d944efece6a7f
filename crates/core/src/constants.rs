//! Constants used throughout the narrative core crate.

/// Directory holding the narrative templates and their manifest.
pub const NARRATIVE_TEMPLATE_DIR: &str = "narrative-templates";

/// Filename of the manifest mapping resource types to template files.
pub const TEMPLATE_MANIFEST_FILENAME: &str = "manifest.yaml";

/// Markup inserted between narratives merged into one section.
pub const SECTION_SEPARATOR: &str = "<hr/>";

/// Prefix of the URN form of a resource reference.
pub const URN_UUID_PREFIX: &str = "urn:uuid:";
