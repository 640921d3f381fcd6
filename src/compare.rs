//! The comparison workflow: extract two quotes, compose the prompt, ask the
//! model, keep the record.
//!
//! [`run_comparison`] returns everything it produced as a
//! [`ComparisonOutcome`]; nothing is held between runs.

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};

use crate::completion::{self, CompletionProvider, CompletionRequest};
use crate::config::Config;
use crate::extract::{self, Extraction, RemoteExtractor, SourceFormat};
use crate::models::CompletionRecord;
use crate::naming;
use crate::prompt;
use crate::remote::DocumentIntelligence;
use crate::store::{CompletionStore, StoreError};
use crate::templates::{TemplateKind, TemplateLibrary, DEFAULT_TEMPLATE_NAME};

/// Inputs for one comparison run.
#[derive(Debug, Clone)]
pub struct ComparisonInput {
    pub file1: PathBuf,
    pub file2: PathBuf,
    pub system_message: String,
    /// User prompt template with `{quote1}` and `{quote2}` placeholders.
    pub prompt_template: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub prefer_remote: bool,
}

/// Extracted quotes and the composed prompt, ready to send.
#[derive(Debug, Clone)]
pub struct PreparedComparison {
    pub request: CompletionRequest,
    pub quote1: Extraction,
    pub quote2: Extraction,
    pub data_file1: String,
    pub data_file2: String,
}

#[derive(Debug)]
pub struct ComparisonOutcome {
    pub record: CompletionRecord,
    /// File name of the saved record, when saving was requested and worked.
    pub saved_as: Option<String>,
    pub save_error: Option<StoreError>,
}

/// Extracts both files and composes the user prompt.
///
/// Extraction problems end up as text inside the prompt; a malformed
/// template or out-of-range sampling parameters are errors.
pub async fn prepare(
    input: &ComparisonInput,
    remote: Option<&dyn RemoteExtractor>,
) -> Result<PreparedComparison> {
    let quote1 = extract::extract(&input.file1, input.prefer_remote, remote).await;
    let quote2 = extract::extract(&input.file2, input.prefer_remote, remote).await;
    tracing::debug!(
        quote1 = ?quote1.path,
        quote2 = ?quote2.path,
        "extracted quotes"
    );

    let user_prompt = prompt::compose(&input.prompt_template, &quote1.text, &quote2.text)
        .context("Invalid user prompt template")?;

    let request = CompletionRequest {
        system_message: input.system_message.clone(),
        user_prompt,
        temperature: input.temperature,
        max_tokens: input.max_tokens,
    };
    request.validate()?;

    Ok(PreparedComparison {
        request,
        quote1,
        quote2,
        data_file1: file_label(&input.file1),
        data_file2: file_label(&input.file2),
    })
}

/// Runs a full comparison and saves the record when `store` is given.
pub async fn run_comparison(
    input: &ComparisonInput,
    remote: Option<&dyn RemoteExtractor>,
    provider: &dyn CompletionProvider,
    store: Option<&CompletionStore>,
) -> Result<ComparisonOutcome> {
    let prepared = prepare(input, remote).await?;
    let completion = completion::get_completion(provider, &prepared.request).await;

    let mut record = CompletionRecord {
        system_message: prepared.request.system_message,
        user_prompt: prepared.request.user_prompt,
        completion,
        data_file1: prepared.data_file1,
        data_file2: prepared.data_file2,
        temperature: prepared.request.temperature,
        max_tokens: prepared.request.max_tokens,
        model: Some(provider.model_name().to_string()),
        timestamp: None,
    };

    let (saved_as, save_error) = match store {
        Some(store) => match store.save(&mut record) {
            Ok(name) => (Some(name), None),
            Err(e) => {
                tracing::warn!("{}", e);
                (None, Some(e))
            }
        },
        None => (None, None),
    };

    Ok(ComparisonOutcome {
        record,
        saved_as,
        save_error,
    })
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// A bare file name that exists in the data directory resolves there;
/// anything else is taken as given.
pub fn resolve_input(config: &Config, path: &Path) -> PathBuf {
    let mut components = path.components();
    let bare = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if bare {
        let in_data = config.paths.data.join(path);
        if in_data.is_file() {
            return in_data;
        }
    }
    path.to_path_buf()
}

fn existing_input(config: &Config, path: &Path) -> Result<PathBuf> {
    let resolved = resolve_input(config, path);
    if !resolved.is_file() {
        bail!("File not found: {}", path.display());
    }
    Ok(resolved)
}

fn remote_client(config: &Config, local: bool) -> Result<Option<DocumentIntelligence>> {
    if local || !config.extraction.prefer_remote {
        return Ok(None);
    }
    DocumentIntelligence::from_config(&config.extraction)
}

// ============ CLI ============

/// Arguments of `quotecmp compare`.
#[derive(Debug, Clone, Default)]
pub struct CompareArgs {
    pub file1: PathBuf,
    pub file2: PathBuf,
    pub system: Option<String>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub deployment: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub local: bool,
    pub save: bool,
    pub dry_run: bool,
}

pub async fn run_compare(config: &Config, args: CompareArgs) -> Result<()> {
    let file1 = existing_input(config, &args.file1)?;
    let file2 = existing_input(config, &args.file2)?;

    let systems =
        TemplateLibrary::load(TemplateKind::SystemMessage, &config.paths.system_messages)?;
    let prompts = TemplateLibrary::load(TemplateKind::UserPrompt, &config.paths.user_prompts)?;
    let system_message = systems.require(args.system.as_deref().unwrap_or(DEFAULT_TEMPLATE_NAME))?;
    let prompt_template = prompts.require(args.prompt.as_deref().unwrap_or(DEFAULT_TEMPLATE_NAME))?;

    let input = ComparisonInput {
        file1,
        file2,
        system_message: system_message.to_string(),
        prompt_template: prompt_template.to_string(),
        temperature: args.temperature.unwrap_or(config.completion.temperature),
        max_tokens: args.max_tokens.unwrap_or(config.completion.max_tokens),
        prefer_remote: config.extraction.prefer_remote && !args.local,
    };

    let remote = remote_client(config, args.local)?;
    let remote = remote.as_ref().map(|r| r as &dyn RemoteExtractor);

    if args.dry_run {
        let prepared = prepare(&input, remote).await?;
        println!("--- System message ---");
        println!("{}", prepared.request.system_message);
        println!();
        println!("--- User prompt ---");
        println!("{}", prepared.request.user_prompt);
        return Ok(());
    }

    let provider =
        completion::provider_for(config, args.model.as_deref(), args.deployment.as_deref())?;
    let store = CompletionStore::new(&config.paths.completions);
    let store = (args.save || config.completion.save_history).then_some(&store);

    println!(
        "Comparing {} and {} with {}...",
        input.file1.display(),
        input.file2.display(),
        provider.model_name()
    );
    let outcome = run_comparison(&input, remote, &provider, store).await?;

    println!();
    println!("{}", outcome.record.completion);

    if let Some(name) = &outcome.saved_as {
        println!();
        println!("Saved as {} ({})", naming::friendly_name(name), name);
    }
    if let Some(e) = outcome.save_error {
        bail!("Completion was not saved: {}", e);
    }
    Ok(())
}

pub async fn run_extract(config: &Config, file: &Path, local: bool) -> Result<()> {
    let path = existing_input(config, file)?;
    let remote = remote_client(config, local)?;
    let extraction = extract::extract(
        &path,
        !local && config.extraction.prefer_remote,
        remote.as_ref().map(|r| r as &dyn RemoteExtractor),
    )
    .await;

    tracing::debug!(path = ?extraction.path, "extraction finished");
    if let Some(e) = &extraction.remote_error {
        eprintln!("Remote extraction failed, used local parser: {}", e);
    }
    println!("{}", extraction.text);
    Ok(())
}

pub fn run_data(config: &Config) -> Result<()> {
    let dir = &config.paths.data;
    if !dir.is_dir() {
        println!("No data directory at {}. Run `quotecmp init` first.", dir.display());
        return Ok(());
    }

    let files = extract::list_data_files(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    if files.is_empty() {
        println!("No documents in {}.", dir.display());
        return Ok(());
    }

    let remote = config.extraction.remote_available();
    println!("Documents in {} ({}):", dir.display(), files.len());
    for path in files {
        let format = SourceFormat::from_path(&path);
        let note = if format.is_local() || remote {
            ""
        } else {
            "  (needs Document Intelligence)"
        };
        println!("  {:<40} {}{}", file_label(&path), format.label(), note);
    }
    Ok(())
}
