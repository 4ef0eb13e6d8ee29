//! Blocking client for the WorkLink Insight HTTP API

use bytes::Bytes;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("analysis response had no message content")]
    MissingContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsersResponse {
    user_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhotosResponse {
    photo_urls: Vec<String>,
}

/// Completion choice returned by `/analyze-image`.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub text: String,
    pub choice: serde_json::Value,
}

pub struct InsightApi {
    client: Client,
    server: String,
}

impl InsightApi {
    pub fn new(server: &str) -> Result<Self, ClientError> {
        Ok(Self {
            client: Client::builder().build()?,
            server: server.trim_end_matches('/').to_string(),
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn get(&self, route: &str, query: &[(&str, &str)]) -> Result<Response, ClientError> {
        let url = format!("{}{}", self.server, route);
        let resp = self.client.get(&url).query(query).send()?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }
        Ok(resp)
    }

    pub fn get_users(&self) -> Result<Vec<String>, ClientError> {
        let resp: UsersResponse = self.get("/get-users", &[])?.json()?;
        Ok(resp.user_names)
    }

    pub fn get_photos(&self, user: Option<&str>) -> Result<Vec<String>, ClientError> {
        let query: Vec<(&str, &str)> = user.map(|u| vec![("user", u)]).unwrap_or_default();
        let resp: PhotosResponse = self.get("/get-photo", &query)?.json()?;
        Ok(resp.photo_urls)
    }

    pub fn analyze_image(&self, photo_url: &str) -> Result<Analysis, ClientError> {
        let choice: serde_json::Value = self
            .get("/analyze-image", &[("photoUrl", photo_url)])?
            .json()?;
        let text = choice["message"]["content"]
            .as_str()
            .ok_or(ClientError::MissingContent)?
            .to_string();
        Ok(Analysis { text, choice })
    }

    pub fn generate_speech(&self, text: &str) -> Result<Bytes, ClientError> {
        Ok(self.get("/generate-speech", &[("text", text)])?.bytes()?)
    }
}
