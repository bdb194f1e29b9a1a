use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;
use voicepulse_core::{realtime::DEFAULT_REALTIME_URL, supervisor::DEFAULT_MAX_ITERATIONS};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub realtime_url: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    pub supervisor_model: String,
    pub supervisor_max_iterations: usize,
    pub mcp_server_url: String,
    pub prompts_path: Option<PathBuf>,
    pub auto_greet: bool,
    pub greeting: String,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let openai_api_base = var_or("OPENAI_API_BASE", "https://api.openai.com/v1")
            .trim_end_matches('/')
            .to_string();
        let realtime_url = var_or("REALTIME_URL", DEFAULT_REALTIME_URL);
        let realtime_model = var_or("REALTIME_MODEL", "gpt-4o-realtime-preview-2025-06-03");
        let realtime_voice = var_or("REALTIME_VOICE", "sage");
        let supervisor_model = var_or("SUPERVISOR_MODEL", "gpt-4.1");

        let max_iterations_str = var_or(
            "SUPERVISOR_MAX_ITERATIONS",
            &DEFAULT_MAX_ITERATIONS.to_string(),
        );
        let supervisor_max_iterations = max_iterations_str
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SUPERVISOR_MAX_ITERATIONS".to_string(),
                    format!("'{}' is not a positive integer", max_iterations_str),
                )
            })?;

        let mcp_server_url = var_or("MCP_SERVER_URL", "http://localhost:8085");
        let prompts_path = std::env::var("PROMPTS_PATH").ok().map(PathBuf::from);

        let auto_greet_str = var_or("AUTO_GREET", "true");
        let auto_greet = match auto_greet_str.to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "AUTO_GREET".to_string(),
                    format!("'{}' is not a boolean", auto_greet_str),
                ));
            }
        };
        let greeting = var_or("GREETING", "hi");

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            openai_api_base,
            realtime_url,
            realtime_model,
            realtime_voice,
            supervisor_model,
            supervisor_max_iterations,
            mcp_server_url,
            prompts_path,
            auto_greet,
            greeting,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            for var in [
                "BIND_ADDRESS",
                "OPENAI_API_KEY",
                "OPENAI_API_BASE",
                "REALTIME_URL",
                "REALTIME_MODEL",
                "REALTIME_VOICE",
                "SUPERVISOR_MODEL",
                "SUPERVISOR_MAX_ITERATIONS",
                "MCP_SERVER_URL",
                "PROMPTS_PATH",
                "AUTO_GREET",
                "GREETING",
                "RUST_LOG",
            ] {
                env::remove_var(var);
            }
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.openai_api_key, "test-openai-key");
        assert_eq!(config.openai_api_base, "https://api.openai.com/v1");
        assert_eq!(config.realtime_url, DEFAULT_REALTIME_URL);
        assert_eq!(config.realtime_voice, "sage");
        assert_eq!(config.supervisor_model, "gpt-4.1");
        assert_eq!(config.supervisor_max_iterations, 6);
        assert_eq!(config.mcp_server_url, "http://localhost:8085");
        assert_eq!(config.prompts_path, None);
        assert!(config.auto_greet);
        assert_eq!(config.greeting, "hi");
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("OPENAI_API_KEY", "custom-openai-key");
            env::set_var("OPENAI_API_BASE", "http://localhost:9000/v1/");
            env::set_var("REALTIME_MODEL", "gpt-realtime");
            env::set_var("REALTIME_VOICE", "alloy");
            env::set_var("SUPERVISOR_MODEL", "gpt-4o-mini");
            env::set_var("SUPERVISOR_MAX_ITERATIONS", "3");
            env::set_var("MCP_SERVER_URL", "http://survey:8085");
            env::set_var("PROMPTS_PATH", "/custom/prompts");
            env::set_var("AUTO_GREET", "false");
            env::set_var("GREETING", "hello");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.openai_api_base, "http://localhost:9000/v1");
        assert_eq!(config.realtime_model, "gpt-realtime");
        assert_eq!(config.realtime_voice, "alloy");
        assert_eq!(config.supervisor_model, "gpt-4o-mini");
        assert_eq!(config.supervisor_max_iterations, 3);
        assert_eq!(config.mcp_server_url, "http://survey:8085");
        assert_eq!(config.prompts_path, Some(PathBuf::from("/custom/prompts")));
        assert!(!config.auto_greet);
        assert_eq!(config.greeting, "hello");
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_zero_iterations_rejected() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("SUPERVISOR_MAX_ITERATIONS", "0");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "SUPERVISOR_MAX_ITERATIONS"),
            _ => panic!("Expected InvalidValue for SUPERVISOR_MAX_ITERATIONS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_auto_greet() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("AUTO_GREET", "sometimes");
        }

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue(var, _)) if var == "AUTO_GREET"
        ));
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "   ");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("OPENAI_API_KEY")),
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }
}
