use thiserror::Error;

use crate::cms::CmsError;
use crate::openai::ProviderError;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(&'static str),

    #[error("CMS error: {0}")]
    Cms(#[from] CmsError),

    #[error("AI provider error: {0}")]
    Provider(#[from] ProviderError),
}
