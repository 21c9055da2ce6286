use std::env;
use std::path::Path;

use anyhow::{Context, Result};

pub const API_KEY_VAR: &str = "API_KEY";
pub const API_BASE_VAR: &str = "GEMINI_API_BASE";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Image model the plush prompt is tuned for.
pub const PLUSH_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformConfig {
    pub api_base: String,
    pub model: String,
    /// Environment variable the credential is read from at call time.
    pub credential_var: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: PLUSH_MODEL.to_string(),
            credential_var: API_KEY_VAR.to_string(),
        }
    }
}

impl TransformConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: env::var(API_BASE_VAR)
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            ..Self::default()
        }
    }

    /// Absent, blank and the literal `undefined` all count as missing.
    pub fn resolve_credential(&self) -> Option<String> {
        non_empty_env(&self.credential_var).filter(|value| value != "undefined")
    }

    pub fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!(
            "{}/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            model_path
        )
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim().to_string();
        if value.len() >= 2 {
            let bytes = value.as_bytes();
            if (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
                || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
            {
                value = value[1..value.len() - 1].to_string();
            }
        }
        vars.push((key.to_string(), value));
    }
    vars
}

/// Loads `path` into the process environment without overriding variables
/// that are already set. Returns how many variables were applied.
pub fn load_dotenv(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    let mut applied = 0;
    for (key, value) in parse_dotenv(&content) {
        if env::var_os(&key).is_some() {
            continue;
        }
        env::set_var(&key, value);
        applied += 1;
    }
    Ok(applied)
}
