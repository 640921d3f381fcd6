//! # Quote Compare CLI (`quotecmp`)
//!
//! ## Usage
//!
//! ```bash
//! quotecmp --config ./config/quotecmp.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quotecmp init` | Create the working directories |
//! | `quotecmp data` | List documents in the data directory |
//! | `quotecmp extract <file>` | Print the text extracted from a document |
//! | `quotecmp compare <file1> <file2>` | Compare two quotes |
//! | `quotecmp system list\|show\|save` | Manage system messages |
//! | `quotecmp prompts list\|show\|save` | Manage user prompt templates |
//! | `quotecmp history list\|show\|rename\|delete` | Manage saved completions |
//! | `quotecmp models` | List configured models |
//!
//! ## Examples
//!
//! ```bash
//! # Compare two quotes from ./data and keep the result
//! quotecmp compare acme.pdf globex.docx --save
//!
//! # Inspect the prompt without calling the model
//! quotecmp compare acme.pdf globex.docx --prompt terse --dry-run
//!
//! # Store a new user prompt from a file
//! quotecmp prompts save terse --file terse.txt
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use quote_compare::compare::{self, CompareArgs};
use quote_compare::templates::{self, TemplateKind};
use quote_compare::{completion, config, history};

/// Quote Compare: summarise and contrast two insurance quotes with an LLM.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means defaults plus environment variables.
#[derive(Parser)]
#[command(name = "quotecmp", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/quotecmp.toml")]
    config: PathBuf,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the system message, user prompt, data and completion directories.
    Init,

    /// List documents in the data directory.
    Data,

    /// Extract and print the text of one document.
    Extract {
        /// Document path, or a file name in the data directory.
        file: PathBuf,

        /// Skip Azure Document Intelligence even when it is configured.
        #[arg(long)]
        local: bool,
    },

    /// Compare two quotes.
    ///
    /// Extracts both documents, fills them into the user prompt template and
    /// sends the prompt with the chosen system message to the model.
    Compare {
        /// First quote (path, or a file name in the data directory).
        file1: PathBuf,

        /// Second quote.
        file2: PathBuf,

        /// System message name.
        #[arg(long)]
        system: Option<String>,

        /// User prompt template name.
        #[arg(long)]
        prompt: Option<String>,

        /// Model identifier or display name.
        #[arg(long)]
        model: Option<String>,

        /// Deployment name for this run, overriding the model's configured one.
        #[arg(long)]
        deployment: Option<String>,

        /// Sampling temperature (0.0 to 1.0).
        #[arg(long)]
        temperature: Option<f64>,

        /// Token budget for the answer (1 to 4000).
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Extract with the local parsers only.
        #[arg(long)]
        local: bool,

        /// Save the result to the completion history.
        #[arg(long)]
        save: bool,

        /// Print the composed prompt without calling the model.
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage system messages.
    System {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Manage user prompt templates.
    Prompts {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Manage saved completions.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// List configured models.
    Models,
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List the available names.
    List,
    /// Print one entry.
    Show { name: String },
    /// Save an entry from a file, or from stdin.
    Save {
        name: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List saved completions, newest first.
    List,
    /// Print a saved completion.
    Show { file: String },
    /// Rename a saved completion. Its timestamp is kept.
    Rename { file: String, name: String },
    /// Delete a saved completion.
    Delete { file: String },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose {
        "quote_compare=debug,warn"
    } else {
        "quote_compare=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_templates(
    cfg: &config::Config,
    kind: TemplateKind,
    action: TemplateAction,
) -> anyhow::Result<()> {
    match action {
        TemplateAction::List => templates::run_list(cfg, kind),
        TemplateAction::Show { name } => templates::run_show(cfg, kind, &name),
        TemplateAction::Save { name, file } => {
            templates::run_save(cfg, kind, &name, file.as_deref())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_with_env(&cli.config, std::env::vars())?;

    match cli.command {
        Commands::Init => {
            cfg.ensure_dirs()?;
            println!("Directories ready:");
            for dir in [
                &cfg.paths.system_messages,
                &cfg.paths.user_prompts,
                &cfg.paths.data,
                &cfg.paths.completions,
            ] {
                println!("  {}", dir.display());
            }
        }
        Commands::Data => {
            compare::run_data(&cfg)?;
        }
        Commands::Extract { file, local } => {
            compare::run_extract(&cfg, &file, local).await?;
        }
        Commands::Compare {
            file1,
            file2,
            system,
            prompt,
            model,
            deployment,
            temperature,
            max_tokens,
            local,
            save,
            dry_run,
        } => {
            let args = CompareArgs {
                file1,
                file2,
                system,
                prompt,
                model,
                deployment,
                temperature,
                max_tokens,
                local,
                save,
                dry_run,
            };
            compare::run_compare(&cfg, args).await?;
        }
        Commands::System { action } => {
            run_templates(&cfg, TemplateKind::SystemMessage, action)?;
        }
        Commands::Prompts { action } => {
            run_templates(&cfg, TemplateKind::UserPrompt, action)?;
        }
        Commands::History { action } => match action {
            HistoryAction::List => history::run_list(&cfg)?,
            HistoryAction::Show { file } => history::run_show(&cfg, &file)?,
            HistoryAction::Rename { file, name } => history::run_rename(&cfg, &file, &name)?,
            HistoryAction::Delete { file } => history::run_delete(&cfg, &file)?,
        },
        Commands::Models => {
            completion::run_models(&cfg)?;
        }
    }

    Ok(())
}
