use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum NarrativeError {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("failed to read input: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write output: {0}")]
    FileWrite(std::io::Error),

    #[error("FHIR error: {0}")]
    Fhir(#[from] fhir::FhirError),
    #[error("input does not contain a FHIR Bundle (found {0})")]
    NotABundle(String),
    #[error("no Composition found in Bundle")]
    NoComposition,
    #[error("no narrative generated (template missing or empty result)")]
    NoNarrativeGenerated,
    #[error("narrative generation failed for {resource}: {reason}")]
    RenderFailed { resource: String, reason: String },

    #[error("could not locate template directory: {0}")]
    TemplateDirNotFound(String),
    #[error("failed to read template manifest {}: {source}", path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid template manifest: {0}")]
    ManifestParse(String),
    #[error("failed to read template {}: {source}", path.display())]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template syntax error in {template}: {message}")]
    TemplateSyntax { template: String, message: String },
}

pub type NarrativeResult<T> = std::result::Result<T, NarrativeError>;
