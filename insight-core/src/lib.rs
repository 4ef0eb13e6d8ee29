pub mod cms;
pub mod config;
pub mod error;
pub mod models;
pub mod openai;

pub use cms::{CmsError, EventQuery, EventSelection, GraphQlCmsClient, SessionEventSource};
pub use config::{Credentials, InsightConfig};
pub use error::InsightError;
pub use models::{EventData, SessionEvent};
pub use openai::{choice_content, OpenAiClient, ProviderError, SpeechProvider, VisionProvider};
