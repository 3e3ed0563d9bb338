use std::env;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "labflow";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime configuration, read once at startup from `LABFLOW_*`
/// environment variables (a `.env` file is honored via dotenvy).
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path.
    pub db_path: PathBuf,
    /// HTTP bind address.
    pub bind_addr: String,
    /// External classifier command: program plus leading args.
    pub classifier_command: String,
    /// Upper bound on one classifier invocation.
    pub classifier_timeout_secs: u64,
    /// Base URL of the text-generation service.
    pub generate_url: String,
    /// Model requested from the text-generation service.
    pub generate_model: String,
    /// Upper bound on one text-generation request.
    pub generate_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("LABFLOW_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("labflow.db")),
            bind_addr: env::var("LABFLOW_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into()),
            classifier_command: env::var("LABFLOW_CLASSIFIER_CMD")
                .unwrap_or_else(|_| "python3 rba/classifier.py".into()),
            classifier_timeout_secs: env_u64("LABFLOW_CLASSIFIER_TIMEOUT_SECS", 60),
            generate_url: env::var("LABFLOW_GENERATE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".into()),
            generate_model: env::var("LABFLOW_GENERATE_MODEL")
                .unwrap_or_else(|_| "medgemma:4b".into()),
            generate_timeout_secs: env_u64("LABFLOW_GENERATE_TIMEOUT_SECS", 120),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("info,{APP_NAME}=debug")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_env_unset() {
        let config = Config::from_env();
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.classifier_timeout_secs, 60);
        assert!(config.classifier_command.contains("classifier"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.3.0");
    }

    #[test]
    fn log_filter_names_the_crate() {
        assert!(default_log_filter().contains("labflow"));
    }
}
