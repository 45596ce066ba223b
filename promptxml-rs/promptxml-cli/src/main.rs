use anyhow::Context;
use clap::Parser;
use promptxml_config::{Config, load};
use promptxml_document::{PROJECTED_PARAMETERS, element_name, write_document};
use promptxml_parser::{ParsedPrompt, parse};
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn";

/// promptxml CLI entry point.
///
/// Reads a prompt copied from CivitAI ("copy generation data") and writes it
/// back out as an XML document referencing the civitai_prompt schema.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "promptxml",
    author,
    version,
    about = "Convert a copied CivitAI text prompt into XML.",
    long_about = None
)]
struct Cli {
    /// The file extracted from CivitAI when copying an image's prompt.
    #[arg(value_name = "TEXT_PROMPT_PATH")]
    text_prompt_path: PathBuf,
    /// The XML file to create.
    #[arg(value_name = "XML_PROMPT_PATH")]
    xml_prompt_path: PathBuf,
}

#[derive(Debug, Error)]
enum InputError {
    #[error("failed to read text prompt from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let report = run(cli)?;

    for message in &report.infos {
        info!("{message}");
    }

    for warning in &report.warnings {
        warn!("{warning}");
    }

    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[derive(Debug, Default)]
struct RunReport {
    infos: Vec<String>,
    warnings: Vec<String>,
}

fn run(cli: Cli) -> anyhow::Result<RunReport> {
    let Cli {
        text_prompt_path,
        xml_prompt_path,
    } = cli;

    let mut infos = Vec::new();
    let mut warnings = Vec::new();

    let config = match load() {
        Ok(outcome) => {
            if outcome.from_file {
                infos.push(format!(
                    "Using promptxml configuration at {}",
                    outcome.path.display()
                ));
            }
            outcome.config
        }
        Err(error) => {
            warnings.push(format!(
                "failed to load promptxml configuration ({error}). Falling back to defaults."
            ));
            Config::default()
        }
    };

    let text = fs::read_to_string(&text_prompt_path).map_err(|source| InputError::Read {
        path: text_prompt_path.clone(),
        source,
    })?;

    let prompt = parse(&text).with_context(|| {
        format!(
            "failed to parse text prompt {}",
            text_prompt_path.display()
        )
    })?;

    write_document(&prompt, &config.document_options(), &xml_prompt_path)?;

    infos.push(format!(
        "Wrote {} from {} (image parameters: {})",
        xml_prompt_path.display(),
        text_prompt_path.display(),
        rendered_elements(&prompt).join(", ")
    ));

    Ok(RunReport { infos, warnings })
}

fn rendered_elements(prompt: &ParsedPrompt) -> Vec<String> {
    PROJECTED_PARAMETERS
        .iter()
        .filter(|key| prompt.parameters.contains_key(key))
        .map(|key| element_name(key))
        .collect()
}

#[cfg(test)]
mod tests;
