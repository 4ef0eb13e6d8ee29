use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::InsightError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct InsightConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cms: CmsConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CmsConfig {
    pub endpoint: String,
    /// Scenario session whose events are browsed
    pub session_id: String,
    pub value_types: Vec<String>,
    pub users_page_size: u32,
    pub photos_page_size: u32,
    pub timeout_seconds: Option<u64>,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cms.scopear.com/api/v3/graphql".to_string(),
            session_id: "135395".to_string(),
            value_types: vec!["PHOTO".to_string()],
            users_page_size: 100,
            photos_page_size: 300,
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub vision_model: String,
    pub vision_prompt: String,
    pub max_tokens: u32,
    pub speech_model: String,
    pub voice: String,
    pub timeout_seconds: Option<u64>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            vision_model: "gpt-4-vision-preview".to_string(),
            vision_prompt: "What’s in this image?".to_string(),
            max_tokens: 300,
            speech_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            timeout_seconds: None,
        }
    }
}

impl InsightConfig {
    /// Load from an optional TOML file, then apply `INSIGHT__SECTION__KEY`
    /// environment overrides.
    pub fn load(path: &str) -> Result<Self, InsightError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("INSIGHT").separator("__"))
            .build()?;
        Ok(s.try_deserialize()?)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}

/// Upstream API secrets, read once at startup.
#[derive(Clone)]
pub struct Credentials {
    pub cms_token: String,
    pub openai_api_key: String,
}

impl Credentials {
    pub const CMS_TOKEN_VAR: &'static str = "SCOPE_AR_API_KEY";
    pub const OPENAI_KEY_VAR: &'static str = "OPENAI_API_KEY";

    pub fn from_env() -> Result<Self, InsightError> {
        let read = |var: &'static str| match std::env::var(var) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(InsightError::MissingCredential(var)),
        };

        Ok(Self {
            cms_token: read(Self::CMS_TOKEN_VAR)?,
            openai_api_key: read(Self::OPENAI_KEY_VAR)?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("cms_token", &"<redacted>")
            .field("openai_api_key", &"<redacted>")
            .finish()
    }
}
