//! Named system messages and user prompt templates.
//!
//! Each collection holds a built-in `Default` entry plus one entry per
//! `<name>.txt` file in its directory. A file named `Default.txt` shadows the
//! built-in.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::Config;

pub const DEFAULT_TEMPLATE_NAME: &str = "Default";

pub const DEFAULT_SYSTEM_MESSAGE: &str = r#"You are an insurance advisor who helps customers compare two given quotes and provide a summary of both while highlighting their key differences. Your goal is to assist the customer in making an informed decision based solely on the information provided in the quotes.

# Steps:

1. Review the details of both insurance quotes carefully.
2. Identify and summarize the key features of each quote, such as:
   - Coverage (e.g., type of coverage, limits, exclusions, etc.).
   - Total cost (e.g., premium, deductible, other charges, etc.).
   - Benefits (e.g., additional services, value-added features, etc.).
   - Limitations (e.g., restrictions, conditions, etc.).
3. Consider the major differences between the quotes, pointing out advantages and disadvantages for each quote.
4. Create key insights that are helpful in comparing the two quotes.
5. Avoid adding any outside information, personal opinions, or recommendations not supported by the provided data.
6. Format your output in a way that is clear, concise, and easy for customers to compare.

# Output Format:

Provide your response in the following format:

**Key features of each quote:**
[Table comparing the two quotes]

**Key Insights:**
- [Insights 1: Describe how Quote 1 and Quote 2 differ.]
- [Insights N: Additional differences, if necessary.]

**Final Note:**
Based on this comparison, the choice depends on the customer's [specific factors or preferences, e.g., budget, coverage type, additional benefits]. Both options align differently with various priorities.

# Notes:

- Be objective and fact-based. Avoid personal biases.
- Include all relevant differences, even if minor, as long as they might affect the customer's decision.
- Encourage the customer to decide based on their priorities, such as budget, type of coverage, or additional benefits.
"#;

pub const DEFAULT_USER_PROMPT: &str = "Compare the following two quotes and provide an analysis of their similarities and differences.

Quote 1:
{quote1}

Quote 2:
{quote2}
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    SystemMessage,
    UserPrompt,
}

impl TemplateKind {
    pub fn builtin(&self) -> &'static str {
        match self {
            TemplateKind::SystemMessage => DEFAULT_SYSTEM_MESSAGE,
            TemplateKind::UserPrompt => DEFAULT_USER_PROMPT,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TemplateKind::SystemMessage => "System message",
            TemplateKind::UserPrompt => "User prompt",
        }
    }

    pub fn dir<'a>(&self, config: &'a Config) -> &'a Path {
        match self {
            TemplateKind::SystemMessage => &config.paths.system_messages,
            TemplateKind::UserPrompt => &config.paths.user_prompts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    kind: TemplateKind,
    entries: BTreeMap<String, String>,
}

impl TemplateLibrary {
    /// Loads the built-in entry plus every `*.txt` file in `dir`. A missing
    /// directory yields just the built-in; unreadable files are skipped.
    pub fn load(kind: TemplateKind, dir: &Path) -> Result<Self> {
        let mut entries = BTreeMap::new();
        entries.insert(DEFAULT_TEMPLATE_NAME.to_string(), kind.builtin().to_string());

        if dir.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
                .with_context(|| format!("Failed to read directory: {}", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "txt"))
                .collect();
            files.sort();

            for path in files {
                let Some(name) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                    continue;
                };
                match std::fs::read_to_string(&path) {
                    Ok(content) => {
                        entries.insert(name, content);
                    }
                    Err(e) => {
                        tracing::warn!(file = %path.display(), "skipping template: {}", e);
                    }
                }
            }
        }

        Ok(Self { kind, entries })
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|s| s.as_str())
    }

    /// `Default` first, then the rest alphabetically.
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![DEFAULT_TEMPLATE_NAME];
        names.extend(
            self.entries
                .keys()
                .map(|k| k.as_str())
                .filter(|k| *k != DEFAULT_TEMPLATE_NAME),
        );
        names
    }

    /// Looks up `name`, listing the available names when it is missing.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name).ok_or_else(|| {
            anyhow::anyhow!(
                "{} '{}' not found. Available: {}",
                self.kind.label(),
                name,
                self.names().join(", ")
            )
        })
    }
}

/// Writes `<dir>/<name>.txt`, creating `dir` if needed.
pub fn save_template(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Please provide a name");
    }
    if name.contains(['/', '\\']) || name.starts_with('.') {
        bail!("Invalid name '{}': must not contain path separators or start with '.'", name);
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    let path = dir.join(format!("{}.txt", name));
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

// ============ CLI ============

pub fn run_list(config: &Config, kind: TemplateKind) -> Result<()> {
    let library = TemplateLibrary::load(kind, kind.dir(config))?;
    let names = library.names();
    println!("{}s ({}):", kind.label(), names.len());
    for name in names {
        let first_line = library
            .get(name)
            .and_then(|c| c.lines().find(|l| !l.trim().is_empty()))
            .unwrap_or("");
        println!("  {:<24} {}", name, truncate(first_line, 60));
    }
    Ok(())
}

pub fn run_show(config: &Config, kind: TemplateKind, name: &str) -> Result<()> {
    let library = TemplateLibrary::load(kind, kind.dir(config))?;
    println!("{}", library.require(name)?);
    Ok(())
}

/// Saves from `file`, or from stdin when no file is given.
pub fn run_save(
    config: &Config,
    kind: TemplateKind,
    name: &str,
    file: Option<&Path>,
) -> Result<()> {
    let content = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?,
    };
    save_template(kind.dir(config), name, &content)?;
    println!("{} '{}' saved successfully!", kind.label(), name.trim());
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_dir_has_only_default() {
        let lib = TemplateLibrary::load(TemplateKind::UserPrompt, Path::new("/nonexistent/x"))
            .unwrap();
        assert_eq!(lib.names(), vec!["Default"]);
        assert_eq!(lib.get("Default"), Some(DEFAULT_USER_PROMPT));
    }

    #[test]
    fn default_prompt_composes() {
        let out = crate::prompt::compose(DEFAULT_USER_PROMPT, "A", "B").unwrap();
        assert!(out.contains("Quote 1:\nA\n\nQuote 2:\nB\n"));
    }

    #[test]
    fn loads_txt_files_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("short.txt"), "Be brief.").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        let lib = TemplateLibrary::load(TemplateKind::SystemMessage, dir.path()).unwrap();
        assert_eq!(lib.names(), vec!["Default", "short"]);
        assert_eq!(lib.get("short"), Some("Be brief."));
        assert_eq!(lib.kind(), TemplateKind::SystemMessage);
    }

    #[test]
    fn file_named_default_shadows_builtin() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Default.txt"), "custom").unwrap();
        let lib = TemplateLibrary::load(TemplateKind::SystemMessage, dir.path()).unwrap();
        assert_eq!(lib.names(), vec!["Default"]);
        assert_eq!(lib.get("Default"), Some("custom"));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("prompts");
        let path = save_template(&target, " terse ", "Q1 {quote1} Q2 {quote2}").unwrap();
        assert_eq!(path, target.join("terse.txt"));
        let lib = TemplateLibrary::load(TemplateKind::UserPrompt, &target).unwrap();
        assert_eq!(lib.get("terse"), Some("Q1 {quote1} Q2 {quote2}"));
    }

    #[test]
    fn save_rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        assert!(save_template(dir.path(), "  ", "x").is_err());
        assert!(save_template(dir.path(), "../escape", "x").is_err());
        assert!(save_template(dir.path(), ".hidden", "x").is_err());
    }

    #[test]
    fn require_lists_available_names() {
        let lib =
            TemplateLibrary::load(TemplateKind::UserPrompt, Path::new("/nonexistent")).unwrap();
        let err = lib.require("missing").unwrap_err().to_string();
        assert!(err.contains("User prompt 'missing' not found"));
        assert!(err.contains("Default"));
    }
}
