use std::env;
use std::path::PathBuf;

use crate::ai::DEFAULT_COMPLETION_URL;
use crate::apollo::DEFAULT_SEARCH_URL;

/// Runtime settings. Everything comes from the environment; CLI flags
/// override individual fields in `main`.
#[derive(Debug, Clone)]
pub struct Config {
    pub search_url: String,
    pub completion_url: String,
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            completion_url: DEFAULT_COMPLETION_URL.to_string(),
            provider: "proxy".to_string(),
            openai_api_key: None,
            anthropic_api_key: None,
            db_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            search_url: non_empty("PROSPECT_SEARCH_URL").unwrap_or(defaults.search_url),
            completion_url: non_empty("PROSPECT_COMPLETION_URL").unwrap_or(defaults.completion_url),
            provider: non_empty("PROSPECT_AI_PROVIDER").unwrap_or(defaults.provider),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            anthropic_api_key: non_empty("ANTHROPIC_API_KEY"),
            db_path: non_empty("PROSPECT_DB").map(PathBuf::from),
        }
    }
}
