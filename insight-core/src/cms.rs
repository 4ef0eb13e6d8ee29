//! CMS client for the AR training-session GraphQL API
//!
//! Provides a `SessionEventSource` trait with one implementation:
//! - **GraphQlCmsClient**: bearer-authenticated POSTs to the CMS GraphQL endpoint
//!
//! Responses are navigated down to `data.scenarioSessionEvents.nodes`. A missing
//! nodes array is an `UnexpectedShape` error, distinct from transport failures.
//! A single node that fails to decode is logged and skipped.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::CmsConfig;
use crate::models::SessionEvent;

const USER_NAMES_QUERY: &str = r#"
query FetchScenarioSessionEvents($valueTypes: [ScenarioStepItemTypeEnum!], $first: Int!, $scenarioSessionId: ID) {
  scenarioSessionEvents(first: $first, valueTypes: $valueTypes, scenarioSessionId: $scenarioSessionId) {
    nodes {
      eventData
    }
  }
}
"#;

const PHOTOS_QUERY: &str = r#"
query FetchScenarioSessionEvents($valueTypes: [ScenarioStepItemTypeEnum!], $first: Int!, $scenarioSessionId: ID) {
  scenarioSessionEvents(first: $first, valueTypes: $valueTypes, scenarioSessionId: $scenarioSessionId) {
    nodes {
      id
      type
      eventData
      photo {
        fileUrl
      }
      scenarioSessionStep {
        scenarioStep {
          id
          name
        }
      }
    }
  }
}
"#;

// ============================================================================
// SessionEventSource trait
// ============================================================================

/// Abstraction over the CMS so handlers can be exercised against fakes.
#[async_trait]
pub trait SessionEventSource: Send + Sync {
    async fn fetch_events(&self, query: EventQuery) -> Result<Vec<SessionEvent>, CmsError>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// Which fields a query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSelection {
    /// `eventData` only
    UserNames,
    /// `eventData`, photo reference and step metadata
    Photos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQuery {
    pub selection: EventSelection,
    pub first: u32,
}

impl EventQuery {
    pub fn user_names(first: u32) -> Self {
        Self {
            selection: EventSelection::UserNames,
            first,
        }
    }

    pub fn photos(first: u32) -> Self {
        Self {
            selection: EventSelection::Photos,
            first,
        }
    }

    fn document(&self) -> &'static str {
        match self.selection {
            EventSelection::UserNames => USER_NAMES_QUERY,
            EventSelection::Photos => PHOTOS_QUERY,
        }
    }
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum CmsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CMS API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Unexpected response structure: {0}")]
    UnexpectedShape(String),

    #[error("Missing CMS API token")]
    MissingApiKey,
}

impl CmsError {
    /// Short category for structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CmsError::Http(_) => "transport",
            CmsError::Api { .. } => "api",
            CmsError::GraphQl(_) => "graphql",
            CmsError::UnexpectedShape(_) => "shape",
            CmsError::MissingApiKey => "config",
        }
    }

    pub fn is_shape_error(&self) -> bool {
        matches!(self, CmsError::UnexpectedShape(_))
    }
}

// ============================================================================
// GraphQL wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: QueryVariables<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryVariables<'a> {
    scenario_session_id: &'a str,
    first: u32,
    value_types: &'a [String],
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorDetail {
    message: String,
}

// ============================================================================
// GraphQlCmsClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GraphQlCmsClient {
    client: Client,
    config: CmsConfig,
    token: String,
}

impl GraphQlCmsClient {
    pub fn new(config: CmsConfig, token: String) -> Result<Self, CmsError> {
        if token.is_empty() {
            return Err(CmsError::MissingApiKey);
        }

        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            config,
            token,
        })
    }

    /// Create a client pointed at a different GraphQL endpoint (for testing)
    pub fn with_endpoint(
        mut config: CmsConfig,
        token: String,
        endpoint: String,
    ) -> Result<Self, CmsError> {
        config.endpoint = endpoint;
        Self::new(config, token)
    }

    async fn post_query(&self, query: EventQuery) -> Result<Value, CmsError> {
        let request = GraphQlRequest {
            query: query.document(),
            variables: QueryVariables {
                scenario_session_id: &self.config.session_id,
                first: query.first,
                value_types: &self.config.value_types,
            },
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "CMS API error");
            return Err(CmsError::Api {
                code: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

/// Pull `data.scenarioSessionEvents.nodes` out of a GraphQL response body.
pub fn extract_nodes(body: Value) -> Result<Vec<SessionEvent>, CmsError> {
    if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
        let details: Vec<GraphQlErrorDetail> =
            serde_json::from_value(errors.clone()).unwrap_or_default();
        if !details.is_empty() {
            let joined = details
                .into_iter()
                .map(|d| d.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CmsError::GraphQl(joined));
        }
    }

    let nodes = body
        .get("data")
        .and_then(|d| d.get("scenarioSessionEvents"))
        .and_then(|e| e.get("nodes"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            CmsError::UnexpectedShape(format!(
                "missing data.scenarioSessionEvents.nodes in {}",
                truncate(&body.to_string(), 200)
            ))
        })?;

    // A node that does not decode is skipped; the rest of the batch stands
    let events = nodes
        .iter()
        .enumerate()
        .filter_map(|(index, node)| match SessionEvent::deserialize(node) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping undecodable session event node");
                None
            }
        })
        .collect();

    Ok(events)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[async_trait]
impl SessionEventSource for GraphQlCmsClient {
    async fn fetch_events(&self, query: EventQuery) -> Result<Vec<SessionEvent>, CmsError> {
        let body = self.post_query(query).await?;
        let events = extract_nodes(body)?;
        tracing::debug!(
            count = events.len(),
            selection = ?query.selection,
            session_id = %self.config.session_id,
            "Fetched session events"
        );
        Ok(events)
    }

    fn name(&self) -> &str {
        "graphql-cms"
    }
}

// ============================================================================
// TESTS
// ============================================================================
