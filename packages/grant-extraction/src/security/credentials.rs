//! Service credentials held in secure memory.
//!
//! Uses the `secrecy` crate so API keys never end up in logs, debug output
//! or error messages.

use std::fmt;

use secrecy::{ExposeSecret, SecretBox};

use crate::error::ConfigError;

/// Environment variable holding the model service key.
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Environment variable holding the search/extraction service key.
pub const TAVILY_API_KEY: &str = "TAVILY_API_KEY";

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value.
    ///
    /// Only call this when building the request that needs it.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Bearer authorization header value.
    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.expose())
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Keys for the model inference and search services.
///
/// Both are required; the pipeline refuses to start without them.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: SecretString,
    pub tavily_api_key: SecretString,
}

impl Credentials {
    pub fn new(openai_api_key: impl Into<String>, tavily_api_key: impl Into<String>) -> Self {
        Self {
            openai_api_key: SecretString::new(openai_api_key),
            tavily_api_key: SecretString::new(tavily_api_key),
        }
    }

    /// Load from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary lookup. Blank values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(SecretString::new)
                .ok_or(ConfigError::MissingCredential(name))
        };

        Ok(Self {
            openai_api_key: require(OPENAI_API_KEY)?,
            tavily_api_key: require(TAVILY_API_KEY)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &"[REDACTED]")
            .field("tavily_api_key", &"[REDACTED]")
            .finish()
    }
}
