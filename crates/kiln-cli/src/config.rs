//! CLI configuration via environment variables

use std::env;

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Disable colored output (KILN_NO_COLOR=1 or NO_COLOR=1)
    pub no_color: bool,
    /// Default to JSON reports (KILN_JSON=1)
    pub default_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            no_color: env::var_os("KILN_NO_COLOR").is_some() || env::var_os("NO_COLOR").is_some(),
            default_json: env::var("KILN_JSON")
                .map(|v| {
                    let lower = v.to_lowercase();
                    lower == "1" || lower == "true" || lower == "json"
                })
                .unwrap_or(false),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
