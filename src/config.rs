//! Configuration module for the metadata client and image stream sources

use crate::error::{Result, SourceError};
use crate::logging::Logger;
use crate::metadata::MetadataClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What an image stream source remembers about a failed resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionPolicy {
    /// Nothing: every call that needs resolution tries again
    #[default]
    RetryOnFailure,
    /// Remember permanent failures (missing tag, missing stream, malformed
    /// pull spec) and return them without another metadata request
    CachePermanentFailures,
}

/// Registry credentials handed through to the delegate opener
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AuthConfig {
    pub fn new(username: String, password: String) -> Self {
        Self {
            username: Some(username),
            password: Some(password),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// API server base URL, e.g. `https://api.cluster.example.com:8443`
    pub api_url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub skip_tls: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub resolution_policy: ResolutionPolicy,
}

impl MetadataConfig {
    pub fn new(api_url: String) -> Self {
        Self {
            api_url,
            bearer_token: None,
            skip_tls: false,
            timeout_secs: None,
            user_agent: None,
            resolution_policy: ResolutionPolicy::default(),
        }
    }

    pub fn has_auth(&self) -> bool {
        self.bearer_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(SourceError::Config("API URL cannot be empty".to_string()));
        }
        if self.bearer_token.as_deref() == Some("") {
            return Err(SourceError::Config(
                "Bearer token cannot be empty; omit it instead".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(SourceError::Config("Timeout must be positive".to_string()));
        }
        Ok(())
    }

    pub fn build_client(&self, logger: Logger) -> Result<MetadataClient> {
        self.validate()?;

        let mut builder = MetadataClient::builder(self.api_url.clone())
            .with_bearer_token(self.bearer_token.clone())
            .with_skip_tls(self.skip_tls)
            .with_logger(logger);
        if let Some(timeout) = self.timeout() {
            builder = builder.with_timeout(timeout);
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.with_user_agent(user_agent.clone());
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: MetadataConfig = serde_json::from_str(
            r#"{"api_url":"https://api.example.com:8443"}"#,
        )
        .unwrap();
        assert!(!config.skip_tls);
        assert!(!config.has_auth());
        assert_eq!(config.timeout(), None);
        assert_eq!(config.resolution_policy, ResolutionPolicy::RetryOnFailure);
    }

    #[test]
    fn test_policy_names() {
        let config: MetadataConfig = serde_json::from_str(
            r#"{"api_url":"https://api.example.com","resolution_policy":"cache-permanent-failures","timeout_secs":30}"#,
        )
        .unwrap();
        assert_eq!(config.resolution_policy, ResolutionPolicy::CachePermanentFailures);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_validate() {
        let mut config = MetadataConfig::new("https://api.example.com".to_string());
        assert!(config.validate().is_ok());
        assert!(config.build_client(Logger::new_quiet()).is_ok());

        config.bearer_token = Some(String::new());
        assert!(config.validate().is_err());

        config.bearer_token = Some("sekrit".to_string());
        assert!(config.has_auth());
        config.timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }
}
