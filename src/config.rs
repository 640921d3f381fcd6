//! Configuration loading.
//!
//! Settings come from a TOML file (all sections optional) and are then
//! overlaid with the environment variables the tool has always honoured:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT` / `_API_KEY` | remote extraction credentials |
//! | `AZURE_OPENAI_DEPLOYMENT_NAME` / `_API_KEY` / `_ENDPOINT` / `_API_VERSION` / `_TOKEN_PARAM` / `_UNSUPPORTED_PARAMS` | the `default` model |
//! | `MODEL_<ID>_NAME` / `_API_KEY` / `_ENDPOINT` / `_API_VERSION` / `_DEPLOYMENT_NAME` / `_TOKEN_PARAM` / `_UNSUPPORTED_PARAMS` | model `<id>` |
//!
//! The result is one explicit [`Config`] built at startup; nothing else
//! reads the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Chat models keyed by identifier.
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_system_messages_dir")]
    pub system_messages: PathBuf,
    #[serde(default = "default_user_prompts_dir")]
    pub user_prompts: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data: PathBuf,
    #[serde(default = "default_completions_dir")]
    pub completions: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            system_messages: default_system_messages_dir(),
            user_prompts: default_user_prompts_dir(),
            data: default_data_dir(),
            completions: default_completions_dir(),
        }
    }
}

fn default_system_messages_dir() -> PathBuf {
    PathBuf::from("system_messages")
}
fn default_user_prompts_dir() -> PathBuf {
    PathBuf::from("user_prompts")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_completions_dir() -> PathBuf {
    PathBuf::from("completions")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// Model used when `--model` is not given.
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Save every completion to the history without `--save`.
    #[serde(default)]
    pub save_history: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_completion_timeout_secs(),
            max_retries: default_max_retries(),
            save_history: false,
        }
    }
}

fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_completion_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Try the remote service before local parsing when it is configured.
    #[serde(default = "default_true")]
    pub prefer_remote: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_extraction_api_version")]
    pub api_version: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_extraction_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            prefer_remote: true,
            endpoint: None,
            api_key: None,
            api_version: default_extraction_api_version(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            timeout_secs: default_extraction_timeout_secs(),
        }
    }
}

impl ExtractionConfig {
    /// Remote extraction needs both an endpoint and a key.
    pub fn remote_available(&self) -> bool {
        is_set(&self.endpoint) && is_set(&self.api_key)
    }
}

fn default_true() -> bool {
    true
}
fn default_extraction_api_version() -> String {
    "2024-11-30".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_max_polls() -> u32 {
    120
}
fn default_extraction_timeout_secs() -> u64 {
    60
}

/// Which request field carries the token budget.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenParam {
    #[default]
    MaxTokens,
    /// Required by reasoning-style deployments that reject `max_tokens`.
    MaxCompletionTokens,
}

impl TokenParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenParam::MaxTokens => "max_tokens",
            TokenParam::MaxCompletionTokens => "max_completion_tokens",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "max_tokens" | "" => Ok(TokenParam::MaxTokens),
            "max_completion_tokens" => Ok(TokenParam::MaxCompletionTokens),
            other => bail!(
                "Unknown token parameter: '{}'. Must be max_tokens or max_completion_tokens.",
                other
            ),
        }
    }
}

/// Connection details for one chat deployment.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModelConfig {
    /// Display name; defaults to the model identifier.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_model_api_version")]
    pub api_version: String,
    /// Deployment to call; defaults to the display name.
    #[serde(default)]
    pub deployment_name: Option<String>,
    #[serde(default)]
    pub token_param: TokenParam,
    /// Request parameters this deployment rejects (e.g. `temperature`).
    #[serde(default)]
    pub unsupported_params: Vec<String>,
}

fn default_model_api_version() -> String {
    "2024-02-15-preview".to_string()
}

impl ModelConfig {
    fn blank() -> Self {
        Self {
            api_version: default_model_api_version(),
            ..Self::default()
        }
    }

    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(id)
    }

    pub fn deployment<'a>(&'a self, id: &'a str) -> &'a str {
        self.deployment_name
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| self.display_name(id))
    }

    pub fn has_credentials(&self) -> bool {
        is_set(&self.api_key) && is_set(&self.endpoint)
    }

    pub fn supports(&self, param: &str) -> bool {
        !self
            .unsupported_params
            .iter()
            .any(|p| p.trim().eq_ignore_ascii_case(param))
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl Config {
    /// Defaults used when no configuration file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Creates the four working directories if they are missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.paths.system_messages,
            &self.paths.user_prompts,
            &self.paths.data,
            &self.paths.completions,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Overlays credentials and model definitions from environment variables.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: BTreeMap<String, String> = vars.into_iter().collect();

        if let Some(v) = vars.get("AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT") {
            self.extraction.endpoint = Some(v.clone());
        }
        if let Some(v) = vars.get("AZURE_DOCUMENT_INTELLIGENCE_API_KEY") {
            self.extraction.api_key = Some(v.clone());
        }

        if let Some(deployment) = vars.get("AZURE_OPENAI_DEPLOYMENT_NAME") {
            let model = self
                .models
                .entry("default".to_string())
                .or_insert_with(ModelConfig::blank);
            model.name = Some(deployment.clone());
            model.deployment_name = Some(deployment.clone());
            apply_model_fields(model, &vars, "AZURE_OPENAI")?;
        }

        let mut prefixes: Vec<String> = vars
            .keys()
            .filter_map(|key| model_env_prefix(key))
            .collect();
        prefixes.sort();
        prefixes.dedup();

        for prefix in prefixes {
            let env_id = &prefix["MODEL_".len()..];
            let id = self
                .models
                .keys()
                .find(|id| env_key(id) == env_id)
                .cloned()
                .unwrap_or_else(|| env_id.to_ascii_lowercase());
            let model = self.models.entry(id).or_insert_with(ModelConfig::blank);
            if let Some(name) = vars.get(&format!("{}_NAME", prefix)) {
                model.name = Some(name.clone());
            }
            if let Some(deployment) = vars.get(&format!("{}_DEPLOYMENT_NAME", prefix)) {
                model.deployment_name = Some(deployment.clone());
            }
            apply_model_fields(model, &vars, &prefix)?;
        }

        Ok(())
    }

    /// Models with both an endpoint and a key, in identifier order.
    pub fn available_models(&self) -> Vec<(&str, &ModelConfig)> {
        self.models
            .iter()
            .filter(|(_, m)| m.has_credentials())
            .map(|(id, m)| (id.as_str(), m))
            .collect()
    }

    /// Picks the model for a run: the requested one (by identifier or display
    /// name), else `completion.default_model`, else the first available model.
    pub fn resolve_model(&self, requested: Option<&str>) -> Result<(&str, &ModelConfig)> {
        let wanted = requested.or(self.completion.default_model.as_deref());

        let (id, model) = match wanted {
            Some(w) => self
                .models
                .iter()
                .find(|(id, m)| id.as_str() == w || m.display_name(id) == w)
                .map(|(id, m)| (id.as_str(), m))
                .ok_or_else(|| anyhow::anyhow!("Unknown model: '{}'", w))?,
            None => self.available_models().into_iter().next().ok_or_else(|| {
                anyhow::anyhow!(
                    "No model configured. Add a [models.<id>] section or set MODEL_<ID>_* variables."
                )
            })?,
        };

        if !model.has_credentials() {
            bail!(
                "Missing API key or endpoint for model: {}",
                model.display_name(id)
            );
        }
        Ok((id, model))
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.completion.temperature) {
            bail!("completion.temperature must be in [0.0, 1.0]");
        }
        if !(1..=4000).contains(&self.completion.max_tokens) {
            bail!("completion.max_tokens must be in [1, 4000]");
        }
        if self.extraction.max_polls == 0 {
            bail!("extraction.max_polls must be >= 1");
        }
        Ok(())
    }
}

/// `gpt-4o` → `GPT_4O`, the form used in `MODEL_<ID>_*` variable names.
pub fn env_key(id: &str) -> String {
    id.to_ascii_uppercase().replace('-', "_")
}

const MODEL_FIELD_SUFFIXES: &[&str] = &[
    "_DEPLOYMENT_NAME",
    "_UNSUPPORTED_PARAMS",
    "_API_VERSION",
    "_TOKEN_PARAM",
    "_API_KEY",
    "_ENDPOINT",
    "_NAME",
];

/// `MODEL_GPT_4_API_KEY` → `MODEL_GPT_4`.
fn model_env_prefix(key: &str) -> Option<String> {
    if !key.starts_with("MODEL_") {
        return None;
    }
    MODEL_FIELD_SUFFIXES.iter().find_map(|suffix| {
        key.strip_suffix(suffix)
            .filter(|prefix| prefix.len() > "MODEL_".len())
            .map(|prefix| prefix.to_string())
    })
}

fn apply_model_fields(
    model: &mut ModelConfig,
    vars: &BTreeMap<String, String>,
    prefix: &str,
) -> Result<()> {
    if let Some(v) = vars.get(&format!("{}_API_KEY", prefix)) {
        model.api_key = Some(v.clone());
    }
    if let Some(v) = vars.get(&format!("{}_ENDPOINT", prefix)) {
        model.endpoint = Some(v.clone());
    }
    if let Some(v) = vars.get(&format!("{}_API_VERSION", prefix)) {
        model.api_version = v.clone();
    }
    if let Some(v) = vars.get(&format!("{}_TOKEN_PARAM", prefix)) {
        model.token_param = TokenParam::parse(v)
            .with_context(|| format!("Invalid {}_TOKEN_PARAM", prefix))?;
    }
    if let Some(v) = vars.get(&format!("{}_UNSUPPORTED_PARAMS", prefix)) {
        model.unsupported_params = v
            .split(',')
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Loads `path` if it exists (defaults otherwise) and overlays `vars`.
pub fn load_with_env<I>(path: &Path, vars: I) -> Result<Config>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        Config::minimal()
    };
    config.apply_env(vars)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.paths.completions, PathBuf::from("completions"));
        assert_eq!(config.completion.temperature, 0.7);
        assert_eq!(config.completion.max_tokens, 1000);
        assert!(config.extraction.prefer_remote);
        assert!(!config.extraction.remote_available());
        assert!(config.models.is_empty());
    }

    #[test]
    fn parses_models_section() {
        let config: Config = toml::from_str(
            r#"
[models.o1-mini]
name = "o1 mini"
api_key = "k"
endpoint = "https://example.openai.azure.com"
token_param = "max_completion_tokens"
unsupported_params = ["temperature"]
"#,
        )
        .unwrap();
        let model = &config.models["o1-mini"];
        assert_eq!(model.display_name("o1-mini"), "o1 mini");
        assert_eq!(model.deployment("o1-mini"), "o1 mini");
        assert_eq!(model.api_version, "2024-02-15-preview");
        assert_eq!(model.token_param, TokenParam::MaxCompletionTokens);
        assert!(!model.supports("temperature"));
        assert!(model.has_credentials());
    }

    #[test]
    fn rejects_unknown_token_param() {
        let parsed: std::result::Result<Config, _> =
            toml::from_str("[models.x]\ntoken_param = \"tokens\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn env_defines_model_by_convention() {
        let mut config = Config::minimal();
        config
            .apply_env(vars(&[
                ("MODEL_GPT_4O_NAME", "gpt-4o"),
                ("MODEL_GPT_4O_API_KEY", "secret"),
                ("MODEL_GPT_4O_ENDPOINT", "https://example.openai.azure.com"),
                ("MODEL_GPT_4O_DEPLOYMENT_NAME", "gpt4o-prod"),
                ("MODEL_GPT_4O_UNSUPPORTED_PARAMS", "Temperature, top_p"),
                ("UNRELATED", "x"),
            ]))
            .unwrap();
        let model = &config.models["gpt_4o"];
        assert_eq!(model.display_name("gpt_4o"), "gpt-4o");
        assert_eq!(model.deployment("gpt_4o"), "gpt4o-prod");
        assert_eq!(model.unsupported_params, vec!["temperature", "top_p"]);
        assert_eq!(config.available_models().len(), 1);
    }

    #[test]
    fn env_overrides_file_model_with_matching_key() {
        let mut config: Config =
            toml::from_str("[models.gpt-4]\nendpoint = \"https://file\"\n").unwrap();
        config
            .apply_env(vars(&[("MODEL_GPT_4_API_KEY", "from-env")]))
            .unwrap();
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models["gpt-4"].api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn env_default_model_and_extraction() {
        let mut config = Config::minimal();
        config
            .apply_env(vars(&[
                ("AZURE_OPENAI_DEPLOYMENT_NAME", "gpt-35"),
                ("AZURE_OPENAI_API_KEY", "k"),
                ("AZURE_OPENAI_ENDPOINT", "https://e"),
                ("AZURE_OPENAI_TOKEN_PARAM", "max_completion_tokens"),
                ("AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT", "https://di"),
                ("AZURE_DOCUMENT_INTELLIGENCE_API_KEY", "dk"),
            ]))
            .unwrap();
        let (id, model) = config.resolve_model(None).unwrap();
        assert_eq!(id, "default");
        assert_eq!(model.display_name(id), "gpt-35");
        assert_eq!(model.token_param, TokenParam::MaxCompletionTokens);
        assert!(config.extraction.remote_available());
    }

    #[test]
    fn extraction_requires_both_values() {
        let mut config = Config::minimal();
        config
            .apply_env(vars(&[("AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT", "https://di")]))
            .unwrap();
        assert!(!config.extraction.remote_available());
    }

    #[test]
    fn resolve_model_reports_missing_credentials() {
        let config: Config = toml::from_str("[models.gpt-4]\napi_key = \"k\"\n").unwrap();
        let err = config.resolve_model(Some("gpt-4")).unwrap_err();
        assert!(err.to_string().contains("Missing API key or endpoint"));
        assert!(config.resolve_model(None).is_err());
        assert!(config.resolve_model(Some("nope")).is_err());
    }

    #[test]
    fn validates_ranges() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[completion]\ntemperature = 1.5\n").unwrap();
        assert!(load_config(&path).is_err());

        std::fs::write(&path, "[completion]\nmax_tokens = 0\n").unwrap();
        assert!(load_config(&path).is_err());

        std::fs::write(&path, "[extraction]\nmax_polls = 0\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_with_env(&dir.path().join("absent.toml"), Vec::new()).unwrap();
        assert_eq!(config.paths.data, PathBuf::from("data"));
    }
}
