//! Runtime configuration, read from the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Credentials and deployment for the Azure OpenAI backend.
#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

/// How the coordinator turns an instruction into steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerKind {
    /// Fixed routing rules.
    Rules,
    /// Ask the language model for a plan.
    Model,
}

/// Workflow configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model backend; `None` selects the offline passthrough model.
    pub model: Option<AzureOpenAiConfig>,
    /// Remote weather server; `None` runs it in-process.
    pub weather_url: Option<String>,
    /// Remote file server; `None` runs it in-process.
    pub files_url: Option<String>,
    /// Root directory of the in-process file server.
    pub output_dir: PathBuf,
    /// Bound on every tool invocation.
    pub tool_timeout: Duration,
    /// Bound on every model call.
    pub model_timeout: Duration,
    pub planner: PlannerKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: None,
            weather_url: None,
            files_url: None,
            output_dir: PathBuf::from("output"),
            tool_timeout: Duration::from_secs(10),
            model_timeout: Duration::from_secs(60),
            planner: PlannerKind::Rules,
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let model = match (get("AZURE_OPENAI_ENDPOINT"), get("AZURE_OPENAI_API_KEY")) {
            (Some(endpoint), Some(api_key)) => Some(AzureOpenAiConfig {
                endpoint,
                api_key,
                deployment: get("AZURE_OPENAI_DEPLOYMENT_NAME").unwrap_or_else(|| "gpt-4o".into()),
                api_version: get("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|| "2024-10-21".into()),
            }),
            (Some(_), None) => {
                return Err(Error::Config(
                    "AZURE_OPENAI_ENDPOINT is set but AZURE_OPENAI_API_KEY is not".into(),
                ))
            }
            _ => None,
        };

        let seconds = |key: &str, default: Duration| -> Result<Duration> {
            match get(key) {
                Some(v) => v
                    .parse::<u64>()
                    .ok()
                    .filter(|s| *s > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| Error::Config(format!("{} must be a positive integer, got {:?}", key, v))),
                None => Ok(default),
            }
        };

        let planner = match get("A2A_PLANNER").as_deref() {
            None | Some("rules") => PlannerKind::Rules,
            Some("model") => PlannerKind::Model,
            Some(other) => {
                return Err(Error::Config(format!(
                    "A2A_PLANNER must be \"rules\" or \"model\", got {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            model,
            weather_url: get("WEATHER_MCP_URL"),
            files_url: get("FILES_MCP_URL"),
            output_dir: get("A2A_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            tool_timeout: seconds("A2A_TOOL_TIMEOUT_SECS", defaults.tool_timeout)?,
            model_timeout: seconds("A2A_MODEL_TIMEOUT_SECS", defaults.model_timeout)?,
            planner,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = from(&[]).unwrap();
        assert!(config.model.is_none());
        assert!(config.weather_url.is_none());
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.tool_timeout, Duration::from_secs(10));
        assert_eq!(config.planner, PlannerKind::Rules);
    }

    #[test]
    fn test_azure_settings() {
        let config = from(&[
            ("AZURE_OPENAI_ENDPOINT", "https://x.openai.azure.com"),
            ("AZURE_OPENAI_API_KEY", "secret"),
            ("A2A_MODEL_TIMEOUT_SECS", "5"),
            ("A2A_PLANNER", "model"),
            ("FILES_MCP_URL", "http://127.0.0.1:8102"),
        ])
        .unwrap();
        let model = config.model.unwrap();
        assert_eq!(model.deployment, "gpt-4o");
        assert_eq!(model.api_version, "2024-10-21");
        assert_eq!(config.model_timeout, Duration::from_secs(5));
        assert_eq!(config.planner, PlannerKind::Model);
        assert_eq!(config.files_url.as_deref(), Some("http://127.0.0.1:8102"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(from(&[("AZURE_OPENAI_ENDPOINT", "https://x")]).is_err());
        assert!(from(&[("A2A_TOOL_TIMEOUT_SECS", "0")]).is_err());
        assert!(from(&[("A2A_TOOL_TIMEOUT_SECS", "ten")]).is_err());
        assert!(from(&[("A2A_PLANNER", "magic")]).is_err());
    }
}
