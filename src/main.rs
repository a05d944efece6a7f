use clap::{Parser, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anyhow::Context;
use fhir::{DocumentFormat, Resource};
use narrative_core::{CoreConfig, NarrativeError, NarrativeService, into_bundle};

const EXIT_USAGE: u8 = 1;
const EXIT_INPUT_NOT_FOUND: u8 = 2;
const EXIT_NO_NARRATIVE: u8 = 3;
const EXIT_IO: u8 = 4;
const EXIT_FAILURE: u8 = 5;

/// Environment variable naming the template directory when `--templates` is not given.
const TEMPLATE_DIR_ENV: &str = "NARRATIVE_TEMPLATE_DIR";

#[derive(Parser, Debug)]
#[command(name = "narrative-generator")]
#[command(version, about = "Generate narratives for FHIR document bundles")]
struct Cli {
    /// Input FHIR document (JSON or XML)
    input: PathBuf,

    /// Output file path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output mode
    #[arg(short, long, value_enum, default_value_t = OutputMode::BundleWithNarratives)]
    mode: OutputMode,

    /// Pretty print output (`-p`, `-p true` or `-p false`)
    #[arg(
        short,
        long,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    pretty: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Narrative template directory (default: $NARRATIVE_TEMPLATE_DIR or ./narrative-templates)
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Output format (default: the input format)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    /// The complete Bundle with all entry narratives populated
    BundleWithNarratives,
    /// The Bundle with entry narratives also carried into Composition sections
    BundleWithSectionText,
    /// Only the XHTML narrative of the input resource itself
    Narrative,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Xml,
}

impl From<OutputFormat> for DocumentFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => DocumentFormat::Json,
            OutputFormat::Xml => DocumentFormat::Xml,
        }
    }
}

/// Main entry point for the narrative generator.
///
/// Reads one FHIR document, generates narratives according to `--mode` and writes the result
/// to `--output` or stdout.
///
/// # Environment Variables
/// - `NARRATIVE_TEMPLATE_DIR`: template directory when `--templates` is not given
/// - `RUST_LOG`: log filter (logs go to stderr)
///
/// # Exit codes
/// `0` success, `1` usage error, `2` input not found, `3` no narrative generated,
/// `4` I/O failure, `5` any other failure.
fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    if let Err(err) = init_tracing(cli.verbose) {
        eprintln!("Error: {err:#}");
        return ExitCode::from(EXIT_FAILURE);
    }

    let template_override = cli
        .templates
        .clone()
        .or_else(|| std::env::var_os(TEMPLATE_DIR_ENV).map(PathBuf::from));

    match run(&cli, template_override) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let mut filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(LevelFilter::WARN.into());
    if verbose {
        for directive in ["narrative_generator=debug", "narrative_core=debug", "fhir=debug"] {
            filter = filter.add_directive(directive.parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

/// Map a failure to the process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<NarrativeError>() {
        Some(NarrativeError::InputNotFound(_)) => EXIT_INPUT_NOT_FOUND,
        Some(NarrativeError::NoNarrativeGenerated) => EXIT_NO_NARRATIVE,
        Some(NarrativeError::FileRead(_) | NarrativeError::FileWrite(_)) => EXIT_IO,
        _ => EXIT_FAILURE,
    }
}

fn run(cli: &Cli, template_override: Option<PathBuf>) -> anyhow::Result<()> {
    if !cli.input.is_file() {
        return Err(NarrativeError::InputNotFound(cli.input.clone()).into());
    }

    let template_dir = narrative_core::resolve_template_dir(template_override)?;
    let config = CoreConfig::new(template_dir)?;
    let service = NarrativeService::from_config(&config)
        .with_context(|| format!("loading templates from {}", config.template_dir().display()))?;

    let text = fs::read_to_string(&cli.input).map_err(NarrativeError::FileRead)?;
    let (resource, input_format) = fhir::parse_document(&text)
        .map_err(NarrativeError::from)
        .with_context(|| format!("parsing {}", cli.input.display()))?;
    let format = cli.format.map_or(input_format, DocumentFormat::from);
    tracing::debug!(input = %cli.input.display(), format = input_format.name(), "parsed input");
    if cli.mode != OutputMode::Narrative && untyped_primitives(input_format, format) {
        tracing::warn!(
            from = input_format.name(),
            to = format.name(),
            "primitive values read from XML are written as JSON strings"
        );
    }

    let output = match cli.mode {
        OutputMode::BundleWithNarratives => {
            let mut bundle = into_bundle(resource)?;
            let report = service.bundle_with_narratives(&mut bundle);
            tracing::info!(
                entries = bundle.entry.len(),
                generated = report.generated,
                failed = report.failures.len(),
                "populated entry narratives"
            );
            serialize(&bundle.into(), format, cli.pretty)?
        }
        OutputMode::BundleWithSectionText => {
            let mut bundle = into_bundle(resource)?;
            let report = service.bundle_with_section_text(&mut bundle)?;
            tracing::info!(
                entries = bundle.entry.len(),
                generated = report.population.generated,
                failed = report.population.failures.len(),
                sections_filled = report.sections.reconciled.filled,
                sections_added = report.sections.synthesized,
                "assembled section text"
            );
            serialize(&bundle.into(), format, cli.pretty)?
        }
        OutputMode::Narrative => {
            let mut resource = resource;
            service.resource_narrative(&mut resource)?.into_string()
        }
    };

    write_output(cli.output.as_deref(), &output)?;
    tracing::info!(mode = ?cli.mode, "done");
    Ok(())
}

/// XML primitives carry no type, so numbers and booleans come out of XML as strings.
fn untyped_primitives(input: DocumentFormat, output: DocumentFormat) -> bool {
    input == DocumentFormat::Xml && output == DocumentFormat::Json
}

fn serialize(resource: &Resource, format: DocumentFormat, pretty: bool) -> anyhow::Result<String> {
    fhir::serialize(resource, format, pretty)
        .map_err(NarrativeError::from)
        .with_context(|| format!("serialising output as {}", format.name()))
}

fn write_output(path: Option<&Path>, output: &str) -> Result<(), NarrativeError> {
    match path {
        Some(path) => fs::write(path, format!("{output}\n")).map_err(NarrativeError::FileWrite),
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{output}").map_err(NarrativeError::FileWrite)
        }
    }
}
