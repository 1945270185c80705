//! Application configuration loading.
//!
//! Reads `config.yaml` (see [`find_config_path`]) and resolves `${VAR}` /
//! `${VAR:-default}` environment references before parsing. Every field has
//! a default, so a missing file or a partial file is valid.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::inference::generation::default_end_of_turn_markers;

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "POCKETAGENT_CONFIG";

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level configuration (mirrors `config.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sandbox root. Defaults to `<data_dir>/sandbox`.
    pub sandbox_root: Option<String>,
    pub agent: AgentSettings,
    pub store: StoreSettings,
    pub model: ModelSettings,
}

impl AppConfig {
    /// The sandbox root with `~` expanded, or the default under the data dir.
    pub fn sandbox_root(&self) -> PathBuf {
        match self.sandbox_root.as_deref() {
            Some(root) if !root.trim().is_empty() => PathBuf::from(expand_tilde(root.trim())),
            _ => crate::data_dir().join("sandbox"),
        }
    }
}

/// Agent loop limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Maximum tool-execution steps per user turn.
    pub max_steps: usize,
    /// Most recent messages considered for the prompt context.
    pub history_messages: usize,
    /// Character budget for the prompt context.
    pub history_char_budget: usize,
    /// Per-result cap before a tool result is truncated.
    pub max_tool_result_chars: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 4,
            history_messages: 24,
            history_char_budget: 24_000,
            max_tool_result_chars: 6_000,
        }
    }
}

/// Sandbox store tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub search_result_limit: usize,
    pub search_snippet_chars: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            search_result_limit: crate::sandbox::store::DEFAULT_SEARCH_LIMIT,
            search_snippet_chars: crate::sandbox::store::DEFAULT_SNIPPET_CHARS,
        }
    }
}

/// OpenAI-compatible model endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Whole-request timeout for streaming calls.
    pub request_timeout_secs: u64,
    pub end_of_turn_markers: Vec<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model_name: "qwen2.5:3b".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            request_timeout_secs: 180,
            end_of_turn_markers: default_end_of_turn_markers(),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file: `$POCKETAGENT_CONFIG`, then `<data_dir>/config.yaml`.
///
/// Returns `None` when neither exists.
pub fn find_config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV_VAR} points at a missing file");
    }

    let candidate = crate::data_dir().join("config.yaml");
    candidate.exists().then_some(candidate)
}

/// Load and parse a config file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_config(&raw)
}

/// Parse config text after environment-variable interpolation.
pub fn parse_config(raw: &str) -> Result<AppConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })
}

/// Load the config file if one exists, otherwise the defaults.
pub fn load_or_default() -> Result<AppConfig, ConfigError> {
    match find_config_path() {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            load_config(&path)
        }
        None => {
            tracing::info!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some((var_name, default)) = expr.split_once(":-") {
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.agent.max_steps, 4);
        assert_eq!(config.agent.history_messages, 24);
        assert_eq!(config.agent.history_char_budget, 24_000);
        assert_eq!(config.store.search_result_limit, 20);
        assert_eq!(config.store.search_snippet_chars, 100);
        assert!(config
            .model
            .end_of_turn_markers
            .contains(&"<|im_end|>".to_string()));
        assert!(config.sandbox_root().ends_with("sandbox"));
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let config = parse_config("agent:\n  max_steps: 2\nmodel:\n  model_name: llama3\n").unwrap();
        assert_eq!(config.agent.max_steps, 2);
        assert_eq!(config.agent.history_messages, 24);
        assert_eq!(config.model.model_name, "llama3");
        assert_eq!(config.model.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = parse_config("  \n").unwrap();
        assert_eq!(config.agent.max_steps, 4);
    }

    #[test]
    fn test_malformed_yaml_is_error() {
        let err = parse_config("agent: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__POCKETAGENT_TEST_UNSET__");
        let result = interpolate_env_vars("${__POCKETAGENT_TEST_UNSET__:-/fallback/path}");
        assert_eq!(result, "/fallback/path");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__POCKETAGENT_TEST_ROOT__", "/custom/root");
        let config = parse_config("sandbox_root: ${__POCKETAGENT_TEST_ROOT__:-/fallback}\n").unwrap();
        assert_eq!(config.sandbox_root(), PathBuf::from("/custom/root"));
        std::env::remove_var("__POCKETAGENT_TEST_ROOT__");
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/Documents");
        assert!(!result.starts_with('~'), "tilde should be expanded");
        assert!(result.ends_with("/Documents"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/definitely/not/here/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
