//! Service configuration
//!
//! Tunables come from `VIDY_*` environment variables with defaults; the
//! platform and API credentials are read from their conventional unprefixed
//! variables and are required.

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use vidy_lib::{
    dispatcher::MAX_REQUEST_TIMEOUT, DispatchConfig, PlatformConfig, ProvisionConfig,
};

/// Credential variables that must be present at startup
pub const REQUIRED_VARIABLES: [&str; 4] = [
    "MINDSDB_EMAIL",
    "MINDSDB_PASSWORD",
    "YOUTUBE_API_KEY",
    "OPENAI_API_KEY",
];

/// Service settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Port of the HTTP API
    pub api_port: u16,

    /// Base URL of the ML platform
    pub platform_url: String,

    /// Path of the platform login endpoint
    pub login_path: String,

    /// Origin allowed to call `/api/*` from a browser
    pub cors_origin: String,

    /// Deadline for all predictions of one request
    pub request_timeout_secs: u64,

    /// Timeout of a single platform HTTP call
    pub platform_timeout_secs: u64,

    /// Maximum wait for one model to finish training
    pub training_timeout_secs: u64,
}

impl ServiceConfig {
    /// Load settings from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("VIDY"))
    }

    /// Load settings from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("VIDY").source(Some(vars)))
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .set_default("api_port", 8080)?
            .set_default("platform_url", "https://cloud.mindsdb.com")?
            .set_default("login_path", "/cloud/login")?
            .set_default("cors_origin", "http://localhost:5000")?
            .set_default("request_timeout_secs", 120)?
            .set_default("platform_timeout_secs", 60)?
            .set_default("training_timeout_secs", 900)?
            .add_source(environment.try_parsing(true))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let limits = [
            ("request_timeout_secs", self.request_timeout_secs, MAX_REQUEST_TIMEOUT),
            ("platform_timeout_secs", self.platform_timeout_secs, MAX_REQUEST_TIMEOUT),
            ("training_timeout_secs", self.training_timeout_secs, MAX_REQUEST_TIMEOUT),
        ];
        for (name, value, max) in limits {
            if value == 0 || value > max.as_secs() {
                anyhow::bail!(
                    "{} must be between 1 and {}, got {}",
                    name,
                    max.as_secs(),
                    value
                );
            }
        }
        Ok(())
    }

    pub fn platform_config(&self, credentials: &Credentials) -> PlatformConfig {
        PlatformConfig {
            login_path: self.login_path.clone(),
            request_timeout: Duration::from_secs(self.platform_timeout_secs),
            ..PlatformConfig::new(
                &self.platform_url,
                &credentials.mindsdb_email,
                &credentials.mindsdb_password,
            )
        }
    }

    pub fn provision_config(&self) -> ProvisionConfig {
        ProvisionConfig {
            training_timeout: Duration::from_secs(self.training_timeout_secs),
            ..ProvisionConfig::default()
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Missing credential variables
#[derive(Debug, thiserror::Error)]
#[error("missing required environment variables: {}", .0.join(", "))]
pub struct MissingCredentials(pub Vec<&'static str>);

/// Secrets needed to talk to the platform and the upstream APIs
#[derive(Clone)]
pub struct Credentials {
    pub mindsdb_email: String,
    pub mindsdb_password: String,
    pub youtube_api_key: String,
    pub openai_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("mindsdb_email", &self.mindsdb_email)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, MissingCredentials> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read every required variable, reporting all missing ones at once
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MissingCredentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = Vec::with_capacity(REQUIRED_VARIABLES.len());
        let mut missing = Vec::new();

        for name in REQUIRED_VARIABLES {
            match lookup(name).filter(|v| !v.trim().is_empty()) {
                Some(value) => values.push(value),
                None => missing.push(name),
            }
        }

        if !missing.is_empty() {
            return Err(MissingCredentials(missing));
        }

        let mut values = values.into_iter();
        let mut next = || values.next().unwrap_or_default();
        Ok(Self {
            mindsdb_email: next(),
            mindsdb_password: next(),
            youtube_api_key: next(),
            openai_api_key: next(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_vars(HashMap::new()).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.platform_url, "https://cloud.mindsdb.com");
        assert_eq!(config.login_path, "/cloud/login");
        assert_eq!(config.cors_origin, "http://localhost:5000");
        assert_eq!(config.dispatch_config().request_timeout, Duration::from_secs(120));
        assert_eq!(
            config.provision_config().training_timeout,
            Duration::from_secs(900)
        );
    }

    #[test]
    fn test_prefixed_overrides() {
        let config = ServiceConfig::from_vars(vars(&[
            ("VIDY_API_PORT", "9000"),
            ("VIDY_PLATFORM_URL", "http://localhost:47334"),
            ("VIDY_REQUEST_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.api_port, 9000);
        assert_eq!(config.platform_url, "http://localhost:47334");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(ServiceConfig::from_vars(vars(&[("VIDY_API_PORT", "not-a-port")])).is_err());
    }

    #[test]
    fn test_timeouts_out_of_range_are_rejected() {
        for (key, value) in [
            ("VIDY_REQUEST_TIMEOUT_SECS", "0"),
            ("VIDY_REQUEST_TIMEOUT_SECS", "100000"),
            ("VIDY_PLATFORM_TIMEOUT_SECS", "0"),
            ("VIDY_TRAINING_TIMEOUT_SECS", "86401"),
        ] {
            let err = ServiceConfig::from_vars(vars(&[(key, value)])).unwrap_err();
            assert!(err.to_string().contains("must be between 1 and 86400"), "{}", err);
        }

        let config = ServiceConfig::from_vars(vars(&[("VIDY_REQUEST_TIMEOUT_SECS", "86400")]))
            .unwrap();
        assert_eq!(config.request_timeout_secs, 86400);
    }

    #[test]
    fn test_platform_config_uses_credentials() {
        let config =
            ServiceConfig::from_vars(vars(&[("VIDY_PLATFORM_TIMEOUT_SECS", "5")])).unwrap();
        let credentials = Credentials {
            mindsdb_email: "me@example.com".to_string(),
            mindsdb_password: "secret".to_string(),
            youtube_api_key: "yt".to_string(),
            openai_api_key: "sk".to_string(),
        };

        let platform = config.platform_config(&credentials);
        assert_eq!(platform.email, "me@example.com");
        assert_eq!(platform.password, "secret");
        assert_eq!(platform.login_path, "/cloud/login");
        assert_eq!(platform.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_credentials_all_present() {
        let env = vars(&[
            ("MINDSDB_EMAIL", "me@example.com"),
            ("MINDSDB_PASSWORD", "secret"),
            ("YOUTUBE_API_KEY", "yt"),
            ("OPENAI_API_KEY", "sk"),
        ]);
        let credentials = Credentials::from_lookup(|name| env.get(name).cloned()).unwrap();

        assert_eq!(credentials.mindsdb_email, "me@example.com");
        assert_eq!(credentials.youtube_api_key, "yt");
        assert_eq!(credentials.openai_api_key, "sk");
        assert!(!format!("{:?}", credentials).contains("secret"));
    }

    #[test]
    fn test_missing_credentials_are_named() {
        let env = vars(&[("MINDSDB_EMAIL", "me@example.com"), ("YOUTUBE_API_KEY", " ")]);
        let err = Credentials::from_lookup(|name| env.get(name).cloned()).unwrap_err();

        assert_eq!(
            err.0,
            vec!["MINDSDB_PASSWORD", "YOUTUBE_API_KEY", "OPENAI_API_KEY"]
        );
        assert_eq!(
            err.to_string(),
            "missing required environment variables: MINDSDB_PASSWORD, YOUTUBE_API_KEY, OPENAI_API_KEY"
        );
    }
}
